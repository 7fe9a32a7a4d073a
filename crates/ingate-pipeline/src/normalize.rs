//! Envelope normalization: canonical timestamps, provenance stamps, and
//! recursive redaction of sensitive fields.
//!
//! Normalization is a pure function over an owned deep copy; the caller's
//! envelope is never mutated. Redaction matches key names, not values: any
//! key that case-insensitively equals a denylisted name has its value
//! replaced wholesale, at any nesting depth, inside arrays included.
//! Compound keys like `email_verified` are deliberately left alone.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

/// Value written in place of redacted fields.
const REDACTED: &str = "***redacted***";

/// Version stamp written to `metadata.normalized_version`.
const NORMALIZED_VERSION: &str = "1.0";

/// Key names whose values are redacted wherever they appear.
const SENSITIVE_KEYS: [&str; 11] = [
    "email",
    "phone",
    "mobile",
    "token",
    "password",
    "api_key",
    "secret",
    "ssn",
    "address",
    "auth",
    "credentials",
];

/// Normalizes validated envelopes before commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct Normalizer;

impl Normalizer {
    /// Creates a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Produces the normalized form of an envelope.
    ///
    /// The result has a UTC millisecond-precision `timestamp`, a
    /// `received_at` stamp, `metadata.normalized` markers, and every
    /// sensitive field redacted. Runs after validation, so the timestamp is
    /// known to parse.
    pub fn normalize(&self, envelope: &Value, received_at: DateTime<Utc>) -> Value {
        let mut normalized = redact(envelope);

        if let Some(map) = normalized.as_object_mut() {
            if let Some(Value::String(raw)) = map.get("timestamp") {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                    map.insert(
                        "timestamp".to_string(),
                        Value::String(canonical_timestamp(parsed.with_timezone(&Utc))),
                    );
                }
            }
            map.insert("received_at".to_string(), Value::String(canonical_timestamp(received_at)));

            let metadata = map
                .entry("metadata".to_string())
                .or_insert_with(|| json!({}));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("normalized".to_string(), Value::Bool(true));
                metadata.insert(
                    "normalized_version".to_string(),
                    Value::String(NORMALIZED_VERSION.to_string()),
                );
            }
        }

        normalized
    }
}

/// UTC ISO-8601 with millisecond precision and a `Z` suffix.
fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|name| key.eq_ignore_ascii_case(name))
}

/// Deep-copies a value, redacting values under sensitive keys.
fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
