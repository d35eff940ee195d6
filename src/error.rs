use std::fmt;

use crate::types::RouteId;

/// Errors raised while evaluating a route predicate.
///
/// These are route-authoring bugs and must be visible: the dispatcher
/// fails the whole `process_record` call rather than masking them as a
/// non-match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Operator key not recognized by the matcher.
    UnknownOperator {
        operator: String,
    },

    /// Operand has the wrong shape for its operator, e.g. a membership
    /// test against a non-list.
    InvalidOperand {
        operator: String,
        detail: String,
    },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::UnknownOperator { operator } =>
                write!(f, "unknown match operator: {operator}"),
            MatchError::InvalidOperand { operator, detail } =>
                write!(f, "invalid operand for operator {operator}: {detail}"),
        }
    }
}

impl std::error::Error for MatchError {}

/// Failure inside a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend rejected or lost the operation.
    Backend(String),

    /// Row referenced by id does not exist.
    NotFound(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Backend(detail) =>
                write!(f, "storage backend error: {detail}"),
            StorageError::NotFound(what) =>
                write!(f, "not found in storage: {what}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Reasons why a connector failed to deliver.
///
/// The `Display` text of the error is what lands in `Delivery::error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Connector-internal deadline elapsed.
    Timeout,

    /// Transport-level failure before the destination answered.
    Network(String),

    /// Destination answered with an error.
    Remote(String),

    /// Resolved target is not usable by this connector.
    InvalidTarget(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::Timeout =>
                write!(f, "delivery timed out"),
            ConnectorError::Network(detail) =>
                write!(f, "network error: {detail}"),
            ConnectorError::Remote(detail) =>
                write!(f, "remote error: {detail}"),
            ConnectorError::InvalidTarget(detail) =>
                write!(f, "invalid target: {detail}"),
        }
    }
}

impl std::error::Error for ConnectorError {}

/// Errors surfaced by the dispatcher to its caller.
///
/// Per-delivery failures are never represented here; they are recorded
/// as `failed` status on the delivery row. Only configuration bugs and
/// storage faults abort a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A route predicate could not be evaluated.
    Rule {
        route_id: RouteId,
        source: MatchError,
    },

    /// The storage backend failed.
    Storage(StorageError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Rule { route_id, source } =>
                write!(f, "route {} failed evaluation: {source}", route_id.0),
            EngineError::Storage(source) =>
                write!(f, "{source}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Rule { source, .. } => Some(source),
            EngineError::Storage(source) => Some(source),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(source: StorageError) -> Self {
        EngineError::Storage(source)
    }
}
