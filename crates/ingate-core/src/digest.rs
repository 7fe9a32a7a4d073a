//! One-way credential digests.
//!
//! Raw API credentials are never persisted: storage holds a short non-secret
//! preview (used to narrow candidate lookups) and a salted HMAC-SHA256
//! digest. Verification recomputes the digest with the stored salt and
//! compares constant-time, so mismatch position never leaks through timing.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the non-secret credential preview stored alongside the digest.
///
/// Long enough to keep candidate sets small, short enough to be useless to
/// an attacker on its own.
pub const PREVIEW_LEN: usize = 8;

const SALT_LEN: usize = 16;

/// Returns the stored lookup preview of a raw credential.
pub fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_LEN).collect()
}

/// Computes a salted digest of a raw credential.
///
/// Output format is `salt_hex:digest_hex` with a fresh random salt, so two
/// digests of the same credential never compare equal as strings.
pub fn compute(raw: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = mac_hex(&salt, raw);
    format!("{}:{digest}", hex::encode(salt))
}

/// Verifies a raw credential against a stored digest.
///
/// Malformed stored digests verify as false rather than erroring; the caller
/// cannot distinguish that case from an ordinary mismatch.
pub fn verify(raw: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let computed = mac_hex(&salt, raw);
    timing_safe_eq(computed.as_bytes(), digest_hex.as_bytes())
}

fn mac_hex(salt: &[u8], raw: &str) -> String {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let mut mac = HmacSha256::new_from_slice(salt).expect("HMAC accepts any key length");
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time byte comparison.
///
/// Unequal lengths return immediately; equal-length inputs are always walked
/// in full so the comparison cost is independent of mismatch position.
pub fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
