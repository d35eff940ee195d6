use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::ConnectorError;
use crate::types::{ConnectorName, Delivery, Record};

/// Outcome of a pre-flight target check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetValidation {
    pub valid: bool,
    pub detail: Option<String>,
}

impl TargetValidation {
    pub fn valid() -> Self {
        Self { valid: true, detail: None }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self { valid: false, detail: Some(detail.into()) }
    }
}

/// A named, pluggable delivery backend.
///
/// Connectors are stateless with respect to the engine; any auth or
/// session state is the connector's own concern. A connector that can
/// hang must bound itself with its own timeout and resolve with an
/// error, so the dispatcher can record `failed` instead of waiting
/// forever.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Deliver one record to the delivery's resolved target.
    ///
    /// The returned payload is connector-defined and is stored on the
    /// delivery as `meta`.
    async fn deliver(
        &self,
        record: &Record,
        delivery: &Delivery,
    ) -> Result<serde_json::Value, ConnectorError>;

    /// Pre-flight check of a resolved target. Never called during
    /// normal dispatch.
    fn validate_target(&self, _target: &str) -> TargetValidation {
        TargetValidation::valid()
    }
}

/// Holds delivery backends registered by name at process start.
#[derive(Default)]
pub struct ConnectorRegistry {
    inner: RwLock<HashMap<ConnectorName, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector, overwriting any prior registration under
    /// the same name.
    pub async fn register(&self, name: impl Into<String>, connector: Arc<dyn Connector>) {
        let mut guard = self.inner.write().await;
        guard.insert(ConnectorName(name.into()), connector);
    }

    pub async fn get(&self, name: &ConnectorName) -> Option<Arc<dyn Connector>> {
        let guard = self.inner.read().await;
        guard.get(name).cloned()
    }

    pub async fn registered_names(&self) -> Vec<ConnectorName> {
        let guard = self.inner.read().await;
        guard.keys().cloned().collect()
    }
}
