use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::types::{
    now_secs, Delivery, DeliveryId, DeliveryStatus, Record, RecordId, Route, RouteId, TenantId,
};

/// Result of an upsert-if-absent delivery insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// No row existed under the idempotency key; the delivery was stored.
    Created(Delivery),

    /// A row already existed under the idempotency key; it is returned
    /// unchanged and nothing was written.
    Existing(Delivery),
}

/// Durable state seam of the engine.
///
/// The delivery table is keyed by id with a uniqueness constraint on
/// `idempotency_key`; `insert_delivery` is the per-row upsert-if-absent
/// that constraint is enforced through. Status writes are always scoped
/// to a single row.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put_record(&self, record: &Record) -> Result<(), StorageError>;

    async fn record(&self, id: &RecordId) -> Result<Option<Record>, StorageError>;

    async fn put_route(&self, route: &Route) -> Result<(), StorageError>;

    /// Enabled routes for a tenant, priority descending. Ordering is
    /// deterministic; it carries no matching semantics.
    async fn routes_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Route>, StorageError>;

    /// Store a delivery unless a row already exists under its
    /// idempotency key.
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<InsertOutcome, StorageError>;

    async fn find_delivery(&self, idempotency_key: &str)
        -> Result<Option<Delivery>, StorageError>;

    async fn delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>, StorageError>;

    /// Transition one delivery row. Replaces `error` and `meta`
    /// wholesale, bumps `updated_at_secs`, and counts an attempt on
    /// every entry into `processing`. Returns the updated row.
    async fn update_status(
        &self,
        id: &DeliveryId,
        status: DeliveryStatus,
        error: Option<String>,
        meta: Option<serde_json::Value>,
    ) -> Result<Delivery, StorageError>;

    /// Failed deliveries for a tenant no older than `max_age`, oldest
    /// first.
    async fn failed_deliveries(
        &self,
        tenant_id: &TenantId,
        max_age: Duration,
    ) -> Result<Vec<Delivery>, StorageError>;

    /// Tenants that currently have failed deliveries inside the window.
    async fn tenants_with_failures(&self, max_age: Duration)
        -> Result<Vec<TenantId>, StorageError>;
}

#[derive(Default)]
struct DeliveryTable {
    by_id: HashMap<DeliveryId, Delivery>,
    by_key: HashMap<String, DeliveryId>,
}

/// In-memory storage for tests and lightweight deployments.
#[derive(Default)]
pub struct InMemoryStorage {
    records: Mutex<HashMap<RecordId, Record>>,
    routes: Mutex<HashMap<RouteId, Route>>,
    deliveries: Mutex<DeliveryTable>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put_record(&self, record: &Record) -> Result<(), StorageError> {
        let mut guard = self.records.lock().await;
        guard.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn record(&self, id: &RecordId) -> Result<Option<Record>, StorageError> {
        let guard = self.records.lock().await;
        Ok(guard.get(id).cloned())
    }

    async fn put_route(&self, route: &Route) -> Result<(), StorageError> {
        let mut guard = self.routes.lock().await;
        guard.insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn routes_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Route>, StorageError> {
        let guard = self.routes.lock().await;
        let mut routes: Vec<Route> = guard
            .values()
            .filter(|route| route.enabled && &route.tenant_id == tenant_id)
            .cloned()
            .collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(routes)
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<InsertOutcome, StorageError> {
        let mut guard = self.deliveries.lock().await;

        if let Some(id) = guard.by_key.get(&delivery.idempotency_key) {
            let existing = guard
                .by_id
                .get(id)
                .cloned()
                .ok_or_else(|| StorageError::Backend("idempotency index out of sync".into()))?;
            return Ok(InsertOutcome::Existing(existing));
        }

        guard
            .by_key
            .insert(delivery.idempotency_key.clone(), delivery.id.clone());
        guard.by_id.insert(delivery.id.clone(), delivery.clone());
        Ok(InsertOutcome::Created(delivery.clone()))
    }

    async fn find_delivery(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Delivery>, StorageError> {
        let guard = self.deliveries.lock().await;
        Ok(guard
            .by_key
            .get(idempotency_key)
            .and_then(|id| guard.by_id.get(id))
            .cloned())
    }

    async fn delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>, StorageError> {
        let guard = self.deliveries.lock().await;
        Ok(guard.by_id.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &DeliveryId,
        status: DeliveryStatus,
        error: Option<String>,
        meta: Option<serde_json::Value>,
    ) -> Result<Delivery, StorageError> {
        let mut guard = self.deliveries.lock().await;
        let delivery = guard
            .by_id
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("delivery {}", id.0)))?;

        if status == DeliveryStatus::Processing {
            delivery.attempts += 1;
        }
        delivery.status = status;
        delivery.error = error;
        delivery.meta = meta;
        delivery.updated_at_secs = now_secs();
        Ok(delivery.clone())
    }

    async fn failed_deliveries(
        &self,
        tenant_id: &TenantId,
        max_age: Duration,
    ) -> Result<Vec<Delivery>, StorageError> {
        let now = now_secs();
        let guard = self.deliveries.lock().await;
        let mut failed: Vec<Delivery> = guard
            .by_id
            .values()
            .filter(|d| {
                d.status == DeliveryStatus::Failed
                    && &d.tenant_id == tenant_id
                    && d.age_secs(now) <= max_age.as_secs()
            })
            .cloned()
            .collect();
        failed.sort_by(|a, b| {
            a.created_at_secs
                .cmp(&b.created_at_secs)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(failed)
    }

    async fn tenants_with_failures(
        &self,
        max_age: Duration,
    ) -> Result<Vec<TenantId>, StorageError> {
        let now = now_secs();
        let guard = self.deliveries.lock().await;
        let mut tenants: Vec<TenantId> = guard
            .by_id
            .values()
            .filter(|d| d.status == DeliveryStatus::Failed && d.age_secs(now) <= max_age.as_secs())
            .map(|d| d.tenant_id.clone())
            .collect();
        tenants.sort_by(|a, b| a.0.cmp(&b.0));
        tenants.dedup();
        Ok(tenants)
    }
}
