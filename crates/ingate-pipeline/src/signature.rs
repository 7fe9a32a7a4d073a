//! HMAC-SHA256 signature verification over the canonical envelope encoding.
//!
//! The signed material is the envelope with the `signature` and
//! `signature_algorithm` fields removed, serialized canonically so producer
//! and gateway agree byte for byte regardless of key order or whitespace.
//! Comparison is constant-time on the hex form.

use hmac::{Hmac, Mac};
use ingate_core::{canonical, digest::timing_safe_eq, GatewayError};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Fields excluded from the signed material.
const EXCLUDED_FIELDS: [&str; 2] = ["signature", "signature_algorithm"];

/// Verifies caller-submitted envelope signatures against a shared secret.
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    /// Creates a verifier over the shared signing secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when the secret is empty. An empty secret
    /// would verify trivially forgeable signatures, so construction refuses
    /// it outright rather than failing per-request.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, GatewayError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(GatewayError::Configuration("signing secret is empty".to_string()));
        }
        Ok(Self { secret })
    }

    /// Computes the expected hex signature for an envelope.
    ///
    /// Exposed so provisioning tools and tests can produce valid signatures;
    /// the gateway itself only compares.
    pub fn sign(&self, envelope: &Value) -> String {
        let material = signable_material(envelope);
        // HMAC accepts keys of any length; construction cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(material.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies the submitted signature against the envelope.
    ///
    /// Accepts the bare hex digest or a `sha256=`-prefixed form. The
    /// comparison runs constant-time over the full hex strings.
    ///
    /// # Errors
    ///
    /// `MissingSignature` when `submitted` is absent or empty,
    /// `InvalidSignature` when the digest does not match.
    pub fn verify(&self, envelope: &Value, submitted: Option<&str>) -> Result<(), GatewayError> {
        let submitted = match submitted {
            Some(s) if !s.is_empty() => s,
            _ => return Err(GatewayError::MissingSignature),
        };
        let submitted = submitted.strip_prefix("sha256=").unwrap_or(submitted);

        let expected = self.sign(envelope);
        if timing_safe_eq(expected.as_bytes(), submitted.as_bytes()) {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature)
        }
    }
}

/// The canonical encoding of an envelope minus its signature fields.
fn signable_material(envelope: &Value) -> String {
    match envelope {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for field in EXCLUDED_FIELDS {
                stripped.remove(field);
            }
            canonical::encode(&Value::Object(stripped))
        },
        other => canonical::encode(other),
    }
}
