//! Core data model for webhook intake, logging, and forwarding
//!
//! Three persistent shapes (endpoints, credentials, logs) plus the transient
//! types that flow through the pipeline. Serialized field names follow the
//! camelCase wire convention of the management API, so a struct here is also
//! its API representation; secret material (`encrypted_secret`,
//! `encrypted_key`) is excluded from serialization entirely.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Default forwarding timeout in milliseconds
pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 30_000;

/// Minimum accepted forwarding timeout
pub const MIN_FORWARD_TIMEOUT_MS: u64 = 1_000;

/// Maximum accepted forwarding timeout
pub const MAX_FORWARD_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// Endpoint Kind
// ============================================================================

/// The two intake protocols an endpoint can speak.
///
/// Immutable after endpoint creation; the credential/secret interpretation
/// follows from it (classic endpoints reference an [`ApiCredential`], nextgen
/// endpoints hold an encrypted shared secret).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Reference-based: the body carries a resource id, detail is fetched
    Classic,
    /// Payload-based: the body carries the event, authenticated by HMAC
    Nextgen,
}

impl EndpointKind {
    /// Get the string representation (as used in intake URLs)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Nextgen => "nextgen",
        }
    }

    /// Content type assumed for replayed bodies when the original request
    /// did not record one
    pub fn default_content_type(&self) -> &'static str {
        match self {
            Self::Classic => "application/x-www-form-urlencoded",
            Self::Nextgen => "application/json",
        }
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Self::Classic),
            "nextgen" => Ok(Self::Nextgen),
            other => Err(format!("unknown endpoint kind: {}", other)),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Status
// ============================================================================

/// Terminal classification of one inbound delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// Delivery fully processed (fetch succeeded / signature verified)
    Success,
    /// Next-gen signature missing, unverifiable, or wrong
    SignatureFailed,
    /// Classic resource fetch failed or no usable credential
    FetchFailed,
    /// Body malformed: unparsable JSON or missing/non-string resource id
    Invalid,
}

impl LogStatus {
    /// Get the string representation (as stored and queried)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SignatureFailed => "signature_failed",
            Self::FetchFailed => "fetch_failed",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Resource Type
// ============================================================================

/// Provider resource families, classified from the resource id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// `tr_` prefix
    Payment,
    /// `ord_` prefix
    Order,
    /// `re_` prefix
    Refund,
    /// `sub_` prefix
    Subscription,
    /// `mdt_` prefix
    Mandate,
    /// `cst_` prefix
    Customer,
    /// Anything else
    Unknown,
}

impl ResourceType {
    /// Classify a resource id by its prefix.
    ///
    /// Pure function of the id; unmapped prefixes (or ids without an
    /// underscore) classify as `Unknown`.
    pub fn from_resource_id(id: &str) -> Self {
        match id.split_once('_') {
            Some(("tr", _)) => Self::Payment,
            Some(("ord", _)) => Self::Order,
            Some(("re", _)) => Self::Refund,
            Some(("sub", _)) => Self::Subscription,
            Some(("mdt", _)) => Self::Mandate,
            Some(("cst", _)) => Self::Customer,
            _ => Self::Unknown,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Order => "order",
            Self::Refund => "refund",
            Self::Subscription => "subscription",
            Self::Mandate => "mandate",
            Self::Customer => "customer",
            Self::Unknown => "unknown",
        }
    }

    /// All values accepted in resource-type filters
    pub const ALL: [&'static str; 7] = [
        "payment",
        "order",
        "refund",
        "subscription",
        "mandate",
        "customer",
        "unknown",
    ];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Parsed Body
// ============================================================================

/// Tagged union of the body shapes the intake layer can produce.
///
/// The raw body is always kept separately; this type exists so resource-id
/// extraction and downstream serialization stay well-typed instead of
/// pattern-matching an untyped blob.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// `application/json` body
    Json(Value),
    /// `application/x-www-form-urlencoded` body, flattened to a flat map
    Form(HashMap<String, String>),
    /// Anything else, kept verbatim
    Raw(String),
}

impl ParsedBody {
    /// Extract the resource id per the classic protocol: the `id` field when
    /// the body is an object, the body itself when it is a bare string.
    ///
    /// Returns `None` for a missing or non-string id; the caller logs the
    /// delivery as invalid.
    pub fn resource_id(&self) -> Option<String> {
        match self {
            Self::Json(Value::Object(map)) => {
                map.get("id").and_then(Value::as_str).map(String::from)
            }
            Self::Json(Value::String(s)) => Some(s.clone()),
            Self::Json(_) => None,
            Self::Form(map) => map.get("id").cloned(),
            Self::Raw(s) => Some(s.clone()),
        }
    }

    /// Extract the next-gen event type, trying the field aliases the
    /// provider has used across versions: `type`, then `event`, then
    /// `eventType`.
    pub fn event_type(&self) -> Option<String> {
        let Self::Json(Value::Object(map)) = self else {
            return None;
        };
        ["type", "event", "eventType"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(String::from)
    }

    /// The `id` field of an object-shaped body, for log search. Unlike
    /// [`resource_id`](Self::resource_id) a raw string body does not count.
    pub fn id_field(&self) -> Option<String> {
        match self {
            Self::Json(Value::Object(map)) => {
                map.get("id").and_then(Value::as_str).map(String::from)
            }
            Self::Form(map) => map.get("id").cloned(),
            _ => None,
        }
    }

    /// Render as plain JSON: objects stay objects, form fields become a
    /// string-valued object, raw bodies become a JSON string.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Json(value) => value.clone(),
            Self::Form(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            Self::Raw(s) => Value::String(s.clone()),
        }
    }
}

impl Serialize for ParsedBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Forwarding configuration attached to an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingConfig {
    /// Whether forwarding is on
    pub enabled: bool,

    /// Downstream URL to POST to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra headers merged into the forwarded request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
}

impl ForwardingConfig {
    /// Whether this config actually produces outbound traffic
    pub fn is_active(&self) -> bool {
        self.enabled && self.url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            headers: HashMap::new(),
            timeout_ms: DEFAULT_FORWARD_TIMEOUT_MS,
        }
    }
}

/// A configured webhook receiver
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Endpoint id
    pub id: Uuid,

    /// Owning tenant
    pub owner_id: String,

    /// Human-readable name
    pub name: String,

    /// Intake protocol; immutable after creation
    pub kind: EndpointKind,

    /// Disabled endpoints reject deliveries with 403
    pub is_enabled: bool,

    /// Classic only: credential used for resource fetches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<Uuid>,

    /// Classic only: allow-list of resource types; non-matching deliveries
    /// are silently dropped without a log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type_filter: Option<Vec<String>>,

    /// Nextgen only: encrypted shared secret. Never serialized.
    #[serde(skip)]
    pub encrypted_secret: Option<String>,

    /// Nextgen only: allow-list of event types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type_filter: Option<Vec<String>>,

    /// Downstream forwarding settings
    pub forwarding: ForwardingConfig,

    /// Desired log retention in days (enforcement is a consumer concern)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,

    /// Deliveries that reached `status=success`
    pub total_received: u64,

    /// Timestamp of the last successful delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_received_at: Option<DateTime<Utc>>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    /// Create an endpoint with defaults (enabled, no filters, forwarding off)
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            kind,
            is_enabled: true,
            credential_id: None,
            resource_type_filter: None,
            encrypted_secret: None,
            event_type_filter: None,
            forwarding: ForwardingConfig::default(),
            retention_days: None,
            total_received: 0,
            last_received_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether a classified resource type passes this endpoint's filter.
    /// No filter means everything passes.
    pub fn accepts_resource_type(&self, resource_type: ResourceType) -> bool {
        match &self.resource_type_filter {
            Some(filter) => filter.iter().any(|t| t == resource_type.as_str()),
            None => true,
        }
    }

    /// Whether an event type passes this endpoint's filter.
    pub fn accepts_event_type(&self, event_type: &str) -> bool {
        match &self.event_type_filter {
            Some(filter) => filter.iter().any(|t| t == event_type),
            None => true,
        }
    }

    /// Canonical intake URL for this endpoint under the given public base
    pub fn intake_url(&self, public_url: &str) -> String {
        format!(
            "{}/api/webhooks/{}/{}/{}",
            public_url, self.kind, self.owner_id, self.id
        )
    }
}

// ============================================================================
// API Credential
// ============================================================================

/// A stored provider API key, encrypted at rest
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredential {
    /// Credential id
    pub id: Uuid,

    /// Owning tenant
    pub owner_id: String,

    /// Display label
    pub label: String,

    /// Encrypted key material. Never serialized.
    #[serde(skip)]
    pub encrypted_key: String,

    /// Last four characters of the plaintext key, for display
    pub last_four: String,

    /// Whether this is the owner's default credential
    pub is_default: bool,

    /// Result of the last validation run
    pub is_valid: bool,

    /// When the key was last validated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Webhook Log
// ============================================================================

/// Audit record of one inbound delivery attempt (or one replay).
///
/// Written exactly once per inbound delivery, including malformed ones.
/// Forwarding fields are set at most once, later, by the detached forwarding
/// task; nothing else ever mutates a log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLog {
    /// Log id
    pub id: Uuid,

    /// Endpoint that received the delivery
    pub endpoint_id: Uuid,

    /// Owning tenant (copied from the endpoint at write time)
    pub owner_id: String,

    /// When the delivery arrived
    pub received_at: DateTime<Utc>,

    /// Handler wall time in milliseconds
    pub processing_time_ms: u64,

    /// Request headers as handed to the handler
    pub headers: HashMap<String, String>,

    /// Parsed body, if parsing got that far
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub parsed_body: Option<ParsedBody>,

    /// Exact body string as received; what forwarding and replay send
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,

    /// Client IP, when derivable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    /// User-Agent header value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Classic: classified resource type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,

    /// Classic: extracted resource id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Classic: the fetched full resource on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_resource: Option<Value>,

    /// Nextgen: extracted event type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    /// Nextgen: outcome of signature verification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_valid: Option<bool>,

    /// Nextgen: raw signature header value as received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_header: Option<String>,

    /// Failure detail (fetch error, signature error, parse error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the forwarding outcome was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded_at: Option<DateTime<Utc>>,

    /// URL the body was forwarded to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_url: Option<String>,

    /// Downstream HTTP status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_status: Option<u16>,

    /// Downstream failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_error: Option<String>,

    /// Forward attempt duration, end to end
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_time_ms: Option<u64>,

    /// Whether this record was produced by a replay
    pub is_replay: bool,

    /// The log this replay re-sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_log_id: Option<Uuid>,

    /// When the replay ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed_at: Option<DateTime<Utc>>,

    /// Who triggered the replay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed_by: Option<String>,

    /// Terminal classification of this delivery
    pub status: LogStatus,
}

impl WebhookLog {
    /// Create a log skeleton; the handler fills protocol-specific fields
    /// before the store insert.
    pub fn new(endpoint_id: Uuid, owner_id: impl Into<String>, status: LogStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            owner_id: owner_id.into(),
            received_at: Utc::now(),
            processing_time_ms: 0,
            headers: HashMap::new(),
            parsed_body: None,
            raw_body: None,
            client_ip: None,
            user_agent: None,
            resource_type: None,
            resource_id: None,
            fetched_resource: None,
            event_type: None,
            signature_valid: None,
            signature_header: None,
            error: None,
            forwarded_at: None,
            forwarding_url: None,
            forwarding_status: None,
            forwarding_error: None,
            forwarding_time_ms: None,
            is_replay: false,
            original_log_id: None,
            replayed_at: None,
            replayed_by: None,
            status,
        }
    }

    /// Record a forwarding outcome. Write-once: returns `false` without
    /// touching anything if an outcome was already recorded.
    pub fn apply_forwarding(
        &mut self,
        url: &str,
        result: &ForwardingResult,
        at: DateTime<Utc>,
    ) -> bool {
        if self.forwarded_at.is_some() {
            return false;
        }
        self.forwarded_at = Some(at);
        self.forwarding_url = Some(url.to_string());
        self.forwarding_status = result.status;
        self.forwarding_error = result.error.clone();
        self.forwarding_time_ms = Some(result.time_ms);
        true
    }
}

// ============================================================================
// Forwarding Result
// ============================================================================

/// Outcome of one delivery attempt by the forwarding engine.
///
/// Transient: embedded into logs and replay responses, never stored on its
/// own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardingResult {
    /// Whether the downstream answered 2xx
    pub success: bool,

    /// Downstream HTTP status, when a response arrived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Attempt duration in milliseconds, end to end
    pub time_ms: u64,

    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForwardingResult {
    /// Successful delivery
    pub fn ok(status: u16, time_ms: u64) -> Self {
        Self {
            success: true,
            status: Some(status),
            time_ms,
            error: None,
        }
    }

    /// Failed delivery, with the downstream status when one was seen
    pub fn failed(error: impl Into<String>, status: Option<u16>, time_ms: u64) -> Self {
        Self {
            success: false,
            status,
            time_ms,
            error: Some(error.into()),
        }
    }
}
