use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Unique identifier for a record.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of record IDs with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

/// Unique identifier for a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteId(pub String);

/// Unique identifier for a delivery, generated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Registered name of a delivery backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorName(pub String);

/// Kind of business event carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Expense,
    Task,
    Bookmark,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Expense => "expense",
            RecordKind::Task => "task",
            RecordKind::Bookmark => "bookmark",
        }
    }
}

/// An immutable business event to be routed and delivered.
///
/// Records are produced once by an external source and are read-only
/// input to matching and templating. The arbitrary typed payload lives
/// in `fields`; `lookup` gives dot-path access over both the built-in
/// columns and the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Logical identifier for the record.
    pub id: RecordId,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Event kind.
    pub kind: RecordKind,

    /// Arbitrary event payload (amount, currency, title, url, tags, ...).
    pub fields: serde_json::Map<String, Value>,

    /// Creation time, seconds since the Unix epoch.
    pub created_at_secs: u64,
}

impl Record {
    /// Create a new record with an empty payload.
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            id: RecordId(id.into()),
            tenant_id: TenantId(tenant_id.into()),
            kind,
            fields: serde_json::Map::new(),
            created_at_secs: now_secs(),
        }
    }

    /// Set a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Resolve a dot-separated path against this record.
    ///
    /// The built-in columns `id`, `tenant_id`, `kind` and `created_at`
    /// shadow payload fields of the same name. A missing intermediate
    /// key and an explicit JSON null both resolve to `None`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        match path {
            "id" => return Some(Value::String(self.id.0.clone())),
            "tenant_id" => return Some(Value::String(self.tenant_id.0.clone())),
            "kind" => return Some(Value::String(self.kind.as_str().to_string())),
            "created_at" => return Some(Value::from(self.created_at_secs)),
            _ => {}
        }

        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }

        if current.is_null() {
            None
        } else {
            Some(current.clone())
        }
    }
}

/// One condition attached to a record field path.
///
/// Decoded once at route load so matching never re-inspects raw JSON
/// shapes. Variant order matters for `untagged`: arrays become
/// membership lists, objects become operator maps, everything else is
/// an exact-equality scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Record value must be a member of the list.
    AnyOf(Vec<Value>),

    /// Every `operator: operand` pair must hold.
    Ops(BTreeMap<String, Value>),

    /// Record value must equal the scalar exactly, no coercion.
    Equals(Value),
}

/// Match predicate of a route: dot-path into the record mapped to the
/// condition that path must satisfy. A route matches only if all pairs
/// match.
pub type MatchPredicate = BTreeMap<String, Condition>;

/// One delivery action of a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAction {
    /// Registered connector name.
    pub connector: ConnectorName,

    /// Destination string, may contain `{{field.path}}` placeholders.
    pub target: String,
}

/// A tenant-scoped rule pairing a match predicate with delivery actions.
///
/// Routes are authored by tenant configuration and are read-only to the
/// engine. `priority` orders evaluation (higher first) but never
/// short-circuits it: all enabled routes are evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub tenant_id: TenantId,
    pub name: String,
    pub priority: i32,
    pub enabled: bool,

    #[serde(rename = "match")]
    pub predicate: MatchPredicate,

    #[serde(rename = "action")]
    pub actions: Vec<RouteAction>,
}

impl Route {
    /// Create an enabled route with priority 0 and no actions.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: RouteId(id.into()),
            tenant_id: TenantId(tenant_id.into()),
            name: name.into(),
            priority: 0,
            enabled: true,
            predicate: MatchPredicate::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a predicate pair.
    pub fn with_condition(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.predicate.insert(path.into(), condition);
        self
    }

    /// Append a delivery action.
    pub fn with_action(mut self, connector: impl Into<String>, target: impl Into<String>) -> Self {
        self.actions.push(RouteAction {
            connector: ConnectorName(connector.into()),
            target: target.into(),
        });
        self
    }
}

/// Delivery lifecycle status.
///
/// `Failed -> Processing` is the only re-entrant edge and is driven
/// exclusively by the retry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Succeeded => "succeeded",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Succeeded | DeliveryStatus::Failed)
    }
}

/// One tracked attempt to deliver one record via one route action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub tenant_id: TenantId,
    pub record_id: RecordId,
    pub route_id: RouteId,
    pub connector: ConnectorName,

    /// Resolved destination string.
    pub target: String,

    /// Deduplication fingerprint, unique per (tenant, record, route).
    pub idempotency_key: String,

    pub status: DeliveryStatus,

    /// Last failure text, if any.
    pub error: Option<String>,

    /// Connector result payload of the last successful attempt.
    pub meta: Option<Value>,

    /// Number of times this delivery has entered `processing`.
    pub attempts: u32,

    pub created_at_secs: u64,
    pub updated_at_secs: u64,
}

impl Delivery {
    /// Create a new `pending` delivery with a generated id.
    pub fn new(
        tenant_id: TenantId,
        record_id: RecordId,
        route_id: RouteId,
        connector: ConnectorName,
        target: String,
        idempotency_key: String,
    ) -> Self {
        let now = now_secs();
        Self {
            id: DeliveryId::generate(),
            tenant_id,
            record_id,
            route_id,
            connector,
            target,
            idempotency_key,
            status: DeliveryStatus::Pending,
            error: None,
            meta: None,
            attempts: 0,
            created_at_secs: now,
            updated_at_secs: now,
        }
    }

    /// Age of this delivery relative to `now`, saturating at zero.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at_secs)
    }
}

/// Per-delivery projection surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub id: DeliveryId,
    pub connector: ConnectorName,
    pub target: String,
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

impl DeliverySummary {
    pub fn of(delivery: &Delivery) -> Self {
        Self {
            id: delivery.id.clone(),
            connector: delivery.connector.clone(),
            target: delivery.target.clone(),
            status: delivery.status,
            error: delivery.error.clone(),
        }
    }
}

/// Per-record outcome returned by `Dispatcher::process_record`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    pub record_id: RecordId,

    /// Number of enabled routes whose predicate matched.
    pub routes_matched: usize,

    /// Number of delivery rows created by this call. Rows reused under
    /// an existing idempotency key are reported but not counted.
    pub deliveries_created: usize,

    pub deliveries: Vec<DeliverySummary>,
}

/// Outcome of one retry sweep pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Failed deliveries inside the window that were re-executed.
    pub scanned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Current time, seconds since the Unix epoch.
pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
