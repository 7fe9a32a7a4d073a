//! Core domain models and strongly-typed identifiers.
//!
//! Defines principals (authenticated callers), event identifiers, the closed
//! event-type enum, and the commit record written to durable storage and
//! handed to the broker. Newtype ID wrappers carry sqlx serialization
//! implementations so they can be bound directly in queries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed event identifier.
///
/// Assigned server-side exactly once, after validation succeeds and before
/// the commit step. Never supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    ///
    /// Uses UUID v4 for globally unique identifiers without coordination.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for EventId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for EventId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed principal identifier.
///
/// A principal is the authenticated owner of an API credential. All ingested
/// events are attributed to exactly one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub Uuid);

impl PrincipalId {
    /// Creates a new random principal ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PrincipalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for PrincipalId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for PrincipalId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for PrincipalId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Closed enum of accepted event types.
///
/// The wire representation uses the dotted form (`ai.action` etc.); anything
/// outside this set is a validation error, never silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A function or tool invocation performed by the subject.
    #[serde(rename = "ai.action")]
    Action,

    /// A choice among options, with optional confidence.
    #[serde(rename = "ai.decision")]
    Decision,

    /// A failure observed by the subject.
    #[serde(rename = "ai.error")]
    Error,

    /// An inbound query to the subject.
    #[serde(rename = "ai.query")]
    Query,

    /// A response produced by the subject.
    #[serde(rename = "ai.response")]
    Response,
}

impl EventType {
    /// Parses the wire representation of an event type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai.action" => Some(Self::Action),
            "ai.decision" => Some(Self::Decision),
            "ai.error" => Some(Self::Error),
            "ai.query" => Some(Self::Query),
            "ai.response" => Some(Self::Response),
            _ => None,
        }
    }

    /// All accepted wire values, for validation error messages.
    pub const fn wire_values() -> [&'static str; 5] {
        ["ai.action", "ai.decision", "ai.error", "ai.query", "ai.response"]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "ai.action"),
            Self::Decision => write!(f, "ai.decision"),
            Self::Error => write!(f, "ai.error"),
            Self::Query => write!(f, "ai.query"),
            Self::Response => write!(f, "ai.response"),
        }
    }
}

impl sqlx::Type<PgDb> for EventType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EventType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        Self::parse(s).ok_or_else(|| format!("invalid event type: {s}").into())
    }
}

impl sqlx::Encode<'_, PgDb> for EventType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Fixed-window rate-limit policy for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Maximum requests accepted per window.
    pub limit: u32,

    /// Window duration in seconds.
    pub window_secs: u32,
}

impl RatePolicy {
    /// Creates a policy with the given limit and window.
    pub const fn new(limit: u32, window_secs: u32) -> Self {
        Self { limit, window_secs }
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self { limit: 100, window_secs: 60 }
    }
}

/// Outcome of a rate-limit check, surfaced as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request is within the window budget.
    pub allowed: bool,

    /// The limit the window was checked against.
    pub limit: u32,

    /// Requests remaining in the current window, clamped at zero.
    pub remaining: u32,

    /// When the current window resets, epoch milliseconds.
    pub reset_at_ms: i64,
}

/// An authenticated caller of the gateway.
///
/// Created by a separate provisioning flow; read-only to the pipeline except
/// for the asynchronous `last_used_at` touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier for this principal.
    pub id: PrincipalId,

    /// The user or organization that provisioned this credential.
    pub owner_id: Uuid,

    /// Human-readable label for the credential.
    pub label: String,

    /// Whether the credential may authenticate requests.
    pub active: bool,

    /// Per-principal rate-limit override; the gateway default applies when
    /// absent.
    pub rate_policy: Option<RatePolicy>,

    /// When this credential last authenticated a request.
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A candidate row returned by the preview-narrowed credential lookup.
///
/// Carries the stored digest alongside the principal so the resolver can run
/// the verified comparison without a second round trip.
#[derive(Debug, Clone)]
pub struct AuthCandidate {
    /// The principal this digest belongs to.
    pub principal: Principal,

    /// Salted one-way digest of the raw credential, `salt_hex:digest_hex`.
    pub key_digest: String,
}

/// The atomic unit written to durable storage and handed to the broker.
///
/// Identical payload goes to both sinks, keyed by `event_id` so retries are
/// idempotent at the storage layer: a duplicate insert with the same id is a
/// no-op, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Server-assigned unique identifier.
    pub event_id: EventId,

    /// Principal the event is attributed to.
    pub principal_id: PrincipalId,

    /// Subject the event is about; doubles as the broker partition key so a
    /// consumer observes events for one subject in publish order.
    pub subject_id: String,

    /// Validated event type.
    pub event_type: EventType,

    /// The full normalized envelope.
    pub payload: serde_json::Value,

    /// Hex-encoded HMAC the caller submitted, retained for audit.
    pub signature: String,

    /// When the gateway accepted the event.
    pub received_at: DateTime<Utc>,
}

/// Result of an insert-or-ignore write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,

    /// A row with this `event_id` already existed; the write was a no-op.
    AlreadyApplied,
}

/// A committed event read back from storage.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEvent {
    /// Server-assigned identifier.
    pub id: EventId,

    /// Principal the event is attributed to.
    pub principal_id: PrincipalId,

    /// Subject identifier.
    pub subject_id: String,

    /// Event type.
    pub event_type: EventType,

    /// The normalized envelope as stored.
    pub payload: sqlx::types::Json<serde_json::Value>,

    /// Submitted signature.
    pub signature: String,

    /// When the gateway accepted the event.
    pub received_at: DateTime<Utc>,
}
