use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::connector::{ConnectorRegistry, TargetValidation};
use crate::error::EngineError;
use crate::idempotency::idempotency_key;
use crate::matcher;
use crate::storage::{InMemoryStorage, InsertOutcome, Storage};
use crate::template::resolve_target;
use crate::types::{
    ConnectorName, Delivery, DeliveryId, DeliveryStatus, DeliverySummary, ProcessReport, Record,
    Route, SweepReport, TenantId,
};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_event(message: &'static str) {
    tracing::info!(message);
}

#[cfg(not(feature = "tracing"))]
fn trace_event(_message: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_sweep_error(delivery_id: &DeliveryId, err: &EngineError) {
    tracing::warn!(delivery_id = %delivery_id.0, error = %err, "retry execution failed");
}

#[cfg(not(feature = "tracing"))]
fn trace_sweep_error(_delivery_id: &DeliveryId, _err: &EngineError) {}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently executing connector calls.
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_in_flight: 100 }
    }
}

/// Pre-flight verdict for one route action.
#[derive(Debug, Clone)]
pub struct ActionValidation {
    pub connector: ConnectorName,
    pub target: String,
    pub validation: TargetValidation,
}

/// Orchestrates rule matching and idempotent delivery.
///
/// `process_record` is the single entry point for the record source;
/// `execute_delivery` is the shared per-delivery execution path that the
/// retry sweep re-enters. Cheap to clone: all state is behind `Arc`s.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn Storage>,
    registry: Arc<ConnectorRegistry>,
    in_flight: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: DispatcherConfig, storage: Arc<dyn Storage>) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            storage,
            registry: Arc::new(ConnectorRegistry::new()),
            in_flight,
            config,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Register a delivery backend, overwriting any prior registration
    /// under the same name. Registration happens once at process start.
    pub async fn register_connector(
        &self,
        name: impl Into<String>,
        connector: Arc<dyn crate::connector::Connector>,
    ) {
        self.registry.register(name, connector).await;
    }

    /// Store or replace a route definition.
    pub async fn add_route(&self, route: Route) -> Result<(), EngineError> {
        self.storage.put_route(&route).await?;
        Ok(())
    }

    /// Route a completed record and execute its deliveries.
    ///
    /// Matching routes are found first; then one delivery per route
    /// action is created unless a row already exists under the same
    /// idempotency key, in which case that row is reused as-is (no new
    /// row, no re-execution). Only newly created deliveries are
    /// executed, concurrently, with sibling failures isolated from one
    /// another and from the caller. A predicate that cannot be
    /// evaluated fails the whole call: that is a route-authoring bug,
    /// not a delivery outcome.
    pub async fn process_record(&self, record: Record) -> Result<ProcessReport, EngineError> {
        // Persisted up front so execute_delivery can re-fetch it later,
        // including from the retry sweep.
        self.storage.put_record(&record).await?;

        let routes = self.storage.routes_for_tenant(&record.tenant_id).await?;

        let mut matched = Vec::new();
        for route in routes {
            let hit = matcher::matches(&record, &route.predicate).map_err(|source| {
                EngineError::Rule {
                    route_id: route.id.clone(),
                    source,
                }
            })?;
            if hit {
                matched.push(route);
            }
        }

        let mut created = Vec::new();
        let mut reused = Vec::new();
        for route in &matched {
            for action in &route.actions {
                let key = idempotency_key(&record.tenant_id, &record.id, &route.id);

                if let Some(existing) = self.storage.find_delivery(&key).await? {
                    reused.push(existing);
                    continue;
                }

                let delivery = Delivery::new(
                    record.tenant_id.clone(),
                    record.id.clone(),
                    route.id.clone(),
                    action.connector.clone(),
                    resolve_target(&action.target, &record),
                    key,
                );

                match self.storage.insert_delivery(&delivery).await? {
                    InsertOutcome::Created(delivery) => {
                        metric_inc("router.delivery.created");
                        created.push(delivery);
                    }
                    InsertOutcome::Existing(delivery) => reused.push(delivery),
                }
            }
        }

        // Settle-all fan-out: every new delivery runs to its own
        // terminal status, one failing sibling never cancels another.
        let mut join = JoinSet::new();
        for delivery in &created {
            let engine = self.clone();
            let id = delivery.id.clone();
            join.spawn(async move { engine.execute_delivery(&id).await });
        }

        let mut storage_fault = None;
        while let Some(result) = join.join_next().await {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => storage_fault = Some(err),
                // A panicked task leaves its row in `processing`, which
                // the report below surfaces as-is.
                Err(_) => trace_event("router.delivery.panicked"),
            }
        }
        if let Some(err) = storage_fault {
            return Err(err);
        }

        // A multi-action route dedups its later actions onto the first
        // action's row; report that row once.
        let mut seen = HashSet::new();
        let mut deliveries = Vec::with_capacity(created.len() + reused.len());
        for delivery in created.iter().chain(reused.iter()) {
            if !seen.insert(delivery.id.clone()) {
                continue;
            }
            let current = self
                .storage
                .delivery(&delivery.id)
                .await?
                .unwrap_or_else(|| delivery.clone());
            deliveries.push(DeliverySummary::of(&current));
        }

        trace_event("router.process_record.completed");
        Ok(ProcessReport {
            record_id: record.id,
            routes_matched: matched.len(),
            deliveries_created: created.len(),
            deliveries,
        })
    }

    /// Run one delivery to a terminal status.
    ///
    /// The `processing` transition is persisted before the connector is
    /// invoked, so a crash mid-delivery leaves a visible `processing`
    /// row instead of a silent `pending`. Connector failures, including
    /// an unregistered connector name, land in `failed` and are never
    /// returned as `Err`; only storage faults are.
    pub async fn execute_delivery(&self, id: &DeliveryId) -> Result<Delivery, EngineError> {
        let delivery = self
            .storage
            .update_status(id, DeliveryStatus::Processing, None, None)
            .await?;

        let Some(connector) = self.registry.get(&delivery.connector).await else {
            metric_inc("router.delivery.failed");
            let failed = self
                .storage
                .update_status(
                    id,
                    DeliveryStatus::Failed,
                    Some(format!("connector not found: {}", delivery.connector.0)),
                    None,
                )
                .await?;
            return Ok(failed);
        };

        // Re-fetched in full rather than threaded through, so retried
        // deliveries and fresh ones see the same record state.
        let record = match self.storage.record(&delivery.record_id).await? {
            Some(record) => record,
            None => {
                metric_inc("router.delivery.failed");
                let failed = self
                    .storage
                    .update_status(
                        id,
                        DeliveryStatus::Failed,
                        Some(format!("record not found: {}", delivery.record_id.0)),
                        None,
                    )
                    .await?;
                return Ok(failed);
            }
        };

        let _permit = self.in_flight.clone().acquire_owned().await.ok();

        match connector.deliver(&record, &delivery).await {
            Ok(meta) => {
                metric_inc("router.delivery.succeeded");
                trace_event("router.delivery.succeeded");
                let done = self
                    .storage
                    .update_status(id, DeliveryStatus::Succeeded, None, Some(meta))
                    .await?;
                Ok(done)
            }
            Err(err) => {
                metric_inc("router.delivery.failed");
                trace_event("router.delivery.failed");
                let failed = self
                    .storage
                    .update_status(id, DeliveryStatus::Failed, Some(err.to_string()), None)
                    .await?;
                Ok(failed)
            }
        }
    }

    /// Re-execute failed deliveries for a tenant, oldest first.
    ///
    /// Only deliveries created inside the `max_age` window are touched;
    /// retries are windowed by age, not bounded by attempt count.
    /// Sequential on purpose: this path is not latency-sensitive, and a
    /// single retry failing must never abort the rest of the sweep.
    pub async fn retry_failed(
        &self,
        tenant_id: &TenantId,
        max_age: Duration,
    ) -> Result<SweepReport, EngineError> {
        let failed = self.storage.failed_deliveries(tenant_id, max_age).await?;

        let mut report = SweepReport::default();
        for delivery in failed {
            report.scanned += 1;
            match self.execute_delivery(&delivery.id).await {
                Ok(done) if done.status == DeliveryStatus::Succeeded => report.succeeded += 1,
                Ok(_) => report.failed += 1,
                Err(err) => {
                    trace_sweep_error(&delivery.id, &err);
                    report.failed += 1;
                }
            }
        }

        metric_inc("router.sweep.completed");
        Ok(report)
    }

    /// Pre-flight a route definition against the registry: unknown
    /// connector names and targets the connector rejects are reported
    /// per action. Never invoked during normal dispatch.
    pub async fn validate_route(&self, route: &Route) -> Vec<ActionValidation> {
        let mut results = Vec::with_capacity(route.actions.len());
        for action in &route.actions {
            let validation = match self.registry.get(&action.connector).await {
                Some(connector) => connector.validate_target(&action.target),
                None => TargetValidation::invalid(format!(
                    "connector not found: {}",
                    action.connector.0
                )),
            };
            results.push(ActionValidation {
                connector: action.connector.clone(),
                target: action.target.clone(),
                validation,
            });
        }
        results
    }
}
