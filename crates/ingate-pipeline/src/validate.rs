//! Structural and temporal validation of inbound event envelopes.
//!
//! Validation aggregates every failure into one rejection rather than
//! stopping at the first, so an integrator can fix a broken envelope in a
//! single round trip. Top-level fields and the structured payload sections
//! are strict; `metadata` stays free-form for caller context.

use chrono::{DateTime, Duration, Utc};
use ingate_core::{
    error::FieldError,
    models::EventType,
    GatewayError,
};
use serde_json::Value;

/// Top-level fields an envelope may carry.
const TOP_LEVEL_FIELDS: [&str; 10] = [
    "event_type",
    "subject_id",
    "subject_version",
    "timestamp",
    "action",
    "decision",
    "error",
    "metadata",
    "signature",
    "signature_algorithm",
];

const ACTION_FIELDS: [&str; 3] = ["function", "parameters", "result"];
const DECISION_FIELDS: [&str; 4] = ["type", "options", "selected", "confidence"];
const ERROR_FIELDS: [&str; 3] = ["code", "message", "details"];

/// Minimum accepted `subject_id` length.
const SUBJECT_ID_MIN_LEN: usize = 10;

/// The only accepted in-body signature algorithm.
const SIGNATURE_ALGORITHM: &str = "HMAC-SHA256";

/// Temporal acceptance bounds for envelope timestamps.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    /// How far into the future a timestamp may sit, tolerating clock skew.
    pub max_future_skew: Duration,

    /// How far into the past a timestamp may sit.
    pub retention_horizon: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { max_future_skew: Duration::seconds(5), retention_horizon: Duration::hours(24) }
    }
}

/// The typed fields later stages need from a validated envelope.
#[derive(Debug, Clone)]
pub struct ValidatedEnvelope {
    /// Parsed event type.
    pub event_type: EventType,

    /// Subject the event is about.
    pub subject_id: String,

    /// Parsed envelope timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Strict structural validator for event envelopes.
pub struct SchemaValidator {
    config: ValidationConfig,
}

impl SchemaValidator {
    /// Creates a validator with the given temporal bounds.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validates an envelope, aggregating every failure found.
    ///
    /// # Errors
    ///
    /// Returns `Validation` carrying one `FieldError` per failure. The
    /// envelope is never partially accepted.
    pub fn validate(&self, envelope: &Value) -> Result<ValidatedEnvelope, GatewayError> {
        let mut errors = Vec::new();

        let Some(map) = envelope.as_object() else {
            return Err(GatewayError::Validation {
                errors: vec![FieldError::new("$", "envelope must be a JSON object")],
            });
        };

        for key in map.keys() {
            if !TOP_LEVEL_FIELDS.contains(&key.as_str()) {
                errors.push(FieldError::new(key.clone(), "unknown field"));
            }
        }

        let event_type = self.check_event_type(map, &mut errors);
        let subject_id = self.check_subject_id(map, &mut errors);
        self.check_subject_version(map, &mut errors);
        let timestamp = self.check_timestamp(map, &mut errors);
        self.check_sections(map, event_type, &mut errors);
        self.check_metadata(map, &mut errors);
        self.check_signature_fields(map, &mut errors);

        match (event_type, subject_id, timestamp) {
            (Some(event_type), Some(subject_id), Some(timestamp)) if errors.is_empty() => {
                Ok(ValidatedEnvelope { event_type, subject_id, timestamp })
            },
            _ => Err(GatewayError::Validation { errors }),
        }
    }

    fn check_event_type(
        &self,
        map: &serde_json::Map<String, Value>,
        errors: &mut Vec<FieldError>,
    ) -> Option<EventType> {
        match map.get("event_type") {
            None => {
                errors.push(FieldError::new("event_type", "required field is missing"));
                None
            },
            Some(Value::String(s)) => match EventType::parse(s) {
                Some(event_type) => Some(event_type),
                None => {
                    errors.push(FieldError::new(
                        "event_type",
                        format!("must be one of {}", EventType::wire_values().join(", ")),
                    ));
                    None
                },
            },
            Some(_) => {
                errors.push(FieldError::new("event_type", "must be a string"));
                None
            },
        }
    }

    fn check_subject_id(
        &self,
        map: &serde_json::Map<String, Value>,
        errors: &mut Vec<FieldError>,
    ) -> Option<String> {
        match map.get("subject_id") {
            None => {
                errors.push(FieldError::new("subject_id", "required field is missing"));
                None
            },
            Some(Value::String(s)) if s.len() >= SUBJECT_ID_MIN_LEN => Some(s.clone()),
            Some(Value::String(_)) => {
                errors.push(FieldError::new(
                    "subject_id",
                    format!("must be at least {SUBJECT_ID_MIN_LEN} characters"),
                ));
                None
            },
            Some(_) => {
                errors.push(FieldError::new("subject_id", "must be a string"));
                None
            },
        }
    }

    fn check_subject_version(
        &self,
        map: &serde_json::Map<String, Value>,
        errors: &mut Vec<FieldError>,
    ) {
        match map.get("subject_version") {
            None => errors.push(FieldError::new("subject_version", "required field is missing")),
            Some(Value::String(s)) if !s.is_empty() => {},
            Some(Value::String(_)) => {
                errors.push(FieldError::new("subject_version", "must not be empty"));
            },
            Some(_) => errors.push(FieldError::new("subject_version", "must be a string")),
        }
    }

    fn check_timestamp(
        &self,
        map: &serde_json::Map<String, Value>,
        errors: &mut Vec<FieldError>,
    ) -> Option<DateTime<Utc>> {
        let raw = match map.get("timestamp") {
            None => {
                errors.push(FieldError::new("timestamp", "required field is missing"));
                return None;
            },
            Some(Value::String(s)) => s,
            Some(_) => {
                errors.push(FieldError::new("timestamp", "must be a string"));
                return None;
            },
        };

        let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
            errors.push(FieldError::new("timestamp", "must be an RFC 3339 timestamp"));
            return None;
        };
        let parsed = parsed.with_timezone(&Utc);

        let now = Utc::now();
        if parsed > now + self.config.max_future_skew {
            errors.push(FieldError::new("timestamp", "timestamp is too far in the future"));
            return None;
        }
        if parsed < now - self.config.retention_horizon {
            errors.push(FieldError::new("timestamp", "timestamp is beyond the retention horizon"));
            return None;
        }

        Some(parsed)
    }

    fn check_sections(
        &self,
        map: &serde_json::Map<String, Value>,
        event_type: Option<EventType>,
        errors: &mut Vec<FieldError>,
    ) {
        self.check_section(map, "action", &ACTION_FIELDS, &["function"], errors);
        self.check_section(map, "decision", &DECISION_FIELDS, &["type"], errors);
        self.check_section(map, "error", &ERROR_FIELDS, &["code", "message"], errors);

        // The structured section must agree with the declared event type:
        // required for action/decision/error events, forbidden otherwise.
        let Some(event_type) = event_type else { return };
        let required = match event_type {
            EventType::Action => Some("action"),
            EventType::Decision => Some("decision"),
            EventType::Error => Some("error"),
            EventType::Query | EventType::Response => None,
        };

        for section in ["action", "decision", "error"] {
            let present = map.contains_key(section);
            match required {
                Some(name) if name == section && !present => {
                    errors.push(FieldError::new(
                        section,
                        format!("required for {event_type} events"),
                    ));
                },
                Some(name) if name != section && present => {
                    errors.push(FieldError::new(
                        section,
                        format!("not allowed for {event_type} events"),
                    ));
                },
                None if present => {
                    errors.push(FieldError::new(
                        section,
                        format!("not allowed for {event_type} events"),
                    ));
                },
                _ => {},
            }
        }
    }

    fn check_section(
        &self,
        map: &serde_json::Map<String, Value>,
        name: &str,
        allowed: &[&str],
        required: &[&str],
        errors: &mut Vec<FieldError>,
    ) {
        let Some(value) = map.get(name) else { return };
        let Some(section) = value.as_object() else {
            errors.push(FieldError::new(name, "must be an object"));
            return;
        };

        for key in section.keys() {
            if !allowed.contains(&key.as_str()) {
                errors.push(FieldError::new(format!("{name}.{key}"), "unknown field"));
            }
        }
        for key in required {
            if !section.contains_key(*key) {
                errors.push(FieldError::new(
                    format!("{name}.{key}"),
                    "required field is missing",
                ));
            }
        }
    }

    fn check_metadata(&self, map: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
        if let Some(metadata) = map.get("metadata") {
            if !metadata.is_object() {
                errors.push(FieldError::new("metadata", "must be an object"));
            }
        }
    }

    fn check_signature_fields(
        &self,
        map: &serde_json::Map<String, Value>,
        errors: &mut Vec<FieldError>,
    ) {
        if let Some(signature) = map.get("signature") {
            if !signature.is_string() {
                errors.push(FieldError::new("signature", "must be a string"));
            }
        }
        match map.get("signature_algorithm") {
            None => {},
            Some(Value::String(s)) if s == SIGNATURE_ALGORITHM => {},
            Some(Value::String(_)) => {
                errors.push(FieldError::new(
                    "signature_algorithm",
                    format!("only {SIGNATURE_ALGORITHM} is supported"),
                ));
            },
            Some(_) => {
                errors.push(FieldError::new("signature_algorithm", "must be a string"));
            },
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn validator() -> SchemaValidator {
        SchemaValidator::default()
    }

    fn query_envelope() -> Value {
        json!({
            "event_type": "ai.query",
            "subject_id": "subject-0001",
            "subject_version": "1.4.2",
            "timestamp": Utc::now().to_rfc3339(),
            "metadata": {"session": "sess-42"}
        })
    }

    fn action_envelope() -> Value {
        json!({
            "event_type": "ai.action",
            "subject_id": "subject-0001",
            "subject_version": "1.4.2",
            "timestamp": Utc::now().to_rfc3339(),
            "action": {"function": "lookup_order", "parameters": {"order_id": "o-17"}}
        })
    }

    fn failures(result: Result<ValidatedEnvelope, GatewayError>) -> Vec<FieldError> {
        match result {
            Err(GatewayError::Validation { errors }) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn valid_envelopes_pass() {
        let validated = validator().validate(&query_envelope()).unwrap();
        assert_eq!(validated.event_type, EventType::Query);
        assert_eq!(validated.subject_id, "subject-0001");

        assert!(validator().validate(&action_envelope()).is_ok());
    }

    #[test]
    fn all_failures_are_aggregated() {
        let envelope = json!({
            "event_type": "ai.unknown",
            "subject_id": "short",
            "bogus": true
        });

        let errors = failures(validator().validate(&envelope));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"event_type"));
        assert!(fields.contains(&"subject_id"));
        assert!(fields.contains(&"subject_version"));
        assert!(fields.contains(&"timestamp"));
        assert!(fields.contains(&"bogus"));
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let mut envelope = query_envelope();
        envelope["extra"] = json!(1);

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "extra" && e.message == "unknown field"));
    }

    #[test]
    fn metadata_accepts_arbitrary_keys() {
        let mut envelope = query_envelope();
        envelope["metadata"] = json!({"anything": {"nested": [1, 2, 3]}, "user_email": "x@y.z"});

        assert!(validator().validate(&envelope).is_ok());
    }

    #[test]
    fn subject_id_must_meet_minimum_length() {
        let mut envelope = query_envelope();
        envelope["subject_id"] = json!("too-short");

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "subject_id"));
    }

    #[test]
    fn action_section_requires_function() {
        let mut envelope = action_envelope();
        envelope["action"] = json!({"parameters": {}});

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "action.function"));
    }

    #[test]
    fn error_section_requires_code_and_message() {
        let envelope = json!({
            "event_type": "ai.error",
            "subject_id": "subject-0001",
            "subject_version": "1.4.2",
            "timestamp": Utc::now().to_rfc3339(),
            "error": {"details": {"attempt": 3}}
        });

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "error.code"));
        assert!(errors.iter().any(|e| e.field == "error.message"));
    }

    #[test]
    fn section_must_agree_with_event_type() {
        // An action event without its section.
        let mut envelope = action_envelope();
        envelope.as_object_mut().unwrap().remove("action");
        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "action"));

        // A query event carrying a decision section.
        let mut envelope = query_envelope();
        envelope["decision"] = json!({"type": "route"});
        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "decision"));
    }

    #[test]
    fn unknown_section_field_is_rejected() {
        let mut envelope = action_envelope();
        envelope["action"]["surprise"] = json!(true);

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "action.surprise"));
    }

    #[test]
    fn timestamp_bounds() {
        let validator = validator();

        // Slight future skew within tolerance.
        let mut envelope = query_envelope();
        envelope["timestamp"] = json!((Utc::now() + Duration::seconds(2)).to_rfc3339());
        assert!(validator.validate(&envelope).is_ok());

        // Beyond the future skew.
        let mut envelope = query_envelope();
        envelope["timestamp"] = json!((Utc::now() + Duration::seconds(10)).to_rfc3339());
        let errors = failures(validator.validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "timestamp"));

        // Beyond the retention horizon.
        let mut envelope = query_envelope();
        envelope["timestamp"] = json!((Utc::now() - Duration::hours(25)).to_rfc3339());
        let errors = failures(validator.validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "timestamp"));
    }

    #[test]
    fn non_utc_offset_timestamps_are_accepted() {
        let mut envelope = query_envelope();
        let local = (Utc::now() - Duration::minutes(5))
            .with_timezone(&chrono::FixedOffset::east_opt(2 * 3600).unwrap());
        envelope["timestamp"] = json!(local.to_rfc3339());

        assert!(validator().validate(&envelope).is_ok());
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        let mut envelope = query_envelope();
        envelope["timestamp"] = json!("yesterday at noon");

        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "timestamp"));
    }

    #[test]
    fn signature_algorithm_is_closed() {
        let mut envelope = query_envelope();
        envelope["signature_algorithm"] = json!("HMAC-SHA256");
        assert!(validator().validate(&envelope).is_ok());

        envelope["signature_algorithm"] = json!("HMAC-MD5");
        let errors = failures(validator().validate(&envelope));
        assert!(errors.iter().any(|e| e.field == "signature_algorithm"));
    }

    #[test]
    fn non_object_envelope_is_rejected() {
        let errors = failures(validator().validate(&json!([1, 2, 3])));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "$");
    }
}
