//! A rule-matching and idempotent delivery engine for business records.
//!
//! This crate routes discrete business events ("records": expenses,
//! tasks, bookmarks) to external destinations according to
//! tenant-configured routes, tracking every attempt as a **Delivery**
//! with an explicit status lifecycle.
//!
//! ## Guarantees
//! - At-most-once delivery creation per (tenant, record, route)
//! - Deterministic rule matching with structured operators
//! - Per-delivery failure isolation: one failing delivery never aborts
//!   its siblings or the processing call
//! - Visible status transitions persisted before and after every
//!   connector invocation
//!
//! ## Non-Guarantees
//! - Exactly-once *execution*: a connector may observe a retried
//!   delivery more than once after a failure
//! - Delivery ordering between concurrent deliveries of one record
//! - Natural-language parsing, authentication, UI rendering
//!
//! Destinations are pluggable [`Connector`] implementations registered
//! by name at process start; durable state lives behind the [`Storage`]
//! trait. The engine itself never speaks to the outside world except
//! through those two seams.

mod connector;
mod dispatcher;
mod error;
mod idempotency;
mod matcher;
mod storage;
mod sweeper;
mod template;
mod types;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use connector::{Connector, ConnectorRegistry, TargetValidation};
pub use dispatcher::{ActionValidation, Dispatcher, DispatcherConfig};
pub use error::{ConnectorError, EngineError, MatchError, StorageError};
pub use idempotency::idempotency_key;
pub use matcher::matches;
pub use storage::{InMemoryStorage, InsertOutcome, Storage};
pub use sweeper::{RetrySweeper, SweeperConfig};
pub use template::resolve_target;
pub use types::{
    Condition, ConnectorName, Delivery, DeliveryId, DeliveryStatus, DeliverySummary,
    MatchPredicate, ProcessReport, Record, RecordId, RecordKind, Route, RouteAction, RouteId,
    SweepReport, TenantId,
};

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStorage;
