#[cfg(feature = "postgres")]
use std::time::Duration;

#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use tokio_postgres::Client;

#[cfg(feature = "postgres")]
use crate::error::StorageError;
#[cfg(feature = "postgres")]
use crate::storage::{InsertOutcome, Storage};
#[cfg(feature = "postgres")]
use crate::types::{
    now_secs, Delivery, DeliveryId, DeliveryStatus, Record, RecordId, Route, TenantId,
};

/// Postgres-backed storage.
///
/// Rows are stored as JSONB payloads with the columns the engine
/// filters on denormalized alongside. The unique index on
/// `idempotency_key` is what turns `insert_delivery` into the
/// upsert-if-absent the at-most-once guarantee rests on.
#[cfg(feature = "postgres")]
pub struct PostgresStorage {
    client: Client,
}

#[cfg(feature = "postgres")]
impl PostgresStorage {
    pub async fn new(client: Client) -> Result<Self, tokio_postgres::Error> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS router_records (
                    id TEXT PRIMARY KEY,
                    payload JSONB NOT NULL
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS router_routes (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    enabled BOOLEAN NOT NULL,
                    priority INTEGER NOT NULL,
                    payload JSONB NOT NULL
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS router_deliveries (
                    id TEXT PRIMARY KEY,
                    idempotency_key TEXT NOT NULL UNIQUE,
                    tenant_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at_secs BIGINT NOT NULL,
                    payload JSONB NOT NULL
                )",
                &[],
            )
            .await?;

        Ok(Self { client })
    }

    async fn store_delivery(&self, delivery: &Delivery) -> Result<(), StorageError> {
        let payload = serde_json::to_value(delivery).map_err(backend)?;
        self.client
            .execute(
                "UPDATE router_deliveries
                 SET status = $2, payload = $3
                 WHERE id = $1",
                &[&delivery.id.0, &delivery.status.as_str(), &payload],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delivery_by_column(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Delivery>, StorageError> {
        let query = format!("SELECT payload FROM router_deliveries WHERE {column} = $1");
        let row = self
            .client
            .query_opt(&query, &[&value])
            .await
            .map_err(backend)?;

        row.map(|row| {
            let payload: serde_json::Value = row.try_get(0).map_err(backend)?;
            serde_json::from_value(payload).map_err(backend)
        })
        .transpose()
    }
}

#[cfg(feature = "postgres")]
fn backend(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[cfg(feature = "postgres")]
fn window_cutoff(max_age: Duration) -> i64 {
    now_secs().saturating_sub(max_age.as_secs()) as i64
}

#[cfg(feature = "postgres")]
#[async_trait]
impl Storage for PostgresStorage {
    async fn put_record(&self, record: &Record) -> Result<(), StorageError> {
        let payload = serde_json::to_value(record).map_err(backend)?;
        self.client
            .execute(
                "INSERT INTO router_records (id, payload)
                 VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload",
                &[&record.id.0, &payload],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn record(&self, id: &RecordId) -> Result<Option<Record>, StorageError> {
        let row = self
            .client
            .query_opt("SELECT payload FROM router_records WHERE id = $1", &[&id.0])
            .await
            .map_err(backend)?;

        row.map(|row| {
            let payload: serde_json::Value = row.try_get(0).map_err(backend)?;
            serde_json::from_value(payload).map_err(backend)
        })
        .transpose()
    }

    async fn put_route(&self, route: &Route) -> Result<(), StorageError> {
        let payload = serde_json::to_value(route).map_err(backend)?;
        self.client
            .execute(
                "INSERT INTO router_routes (id, tenant_id, enabled, priority, payload)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                    tenant_id = EXCLUDED.tenant_id,
                    enabled = EXCLUDED.enabled,
                    priority = EXCLUDED.priority,
                    payload = EXCLUDED.payload",
                &[
                    &route.id.0,
                    &route.tenant_id.0,
                    &route.enabled,
                    &route.priority,
                    &payload,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn routes_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<Route>, StorageError> {
        let rows = self
            .client
            .query(
                "SELECT payload FROM router_routes
                 WHERE tenant_id = $1 AND enabled
                 ORDER BY priority DESC, id ASC",
                &[&tenant_id.0],
            )
            .await
            .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get(0).map_err(backend)?;
                serde_json::from_value(payload).map_err(backend)
            })
            .collect()
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<InsertOutcome, StorageError> {
        let payload = serde_json::to_value(delivery).map_err(backend)?;
        let inserted = self
            .client
            .execute(
                "INSERT INTO router_deliveries
                    (id, idempotency_key, tenant_id, status, created_at_secs, payload)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (idempotency_key) DO NOTHING",
                &[
                    &delivery.id.0,
                    &delivery.idempotency_key,
                    &delivery.tenant_id.0,
                    &delivery.status.as_str(),
                    &(delivery.created_at_secs as i64),
                    &payload,
                ],
            )
            .await
            .map_err(backend)?;

        if inserted == 1 {
            return Ok(InsertOutcome::Created(delivery.clone()));
        }

        match self.find_delivery(&delivery.idempotency_key).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StorageError::Backend(
                "conflicting delivery row disappeared".into(),
            )),
        }
    }

    async fn find_delivery(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Delivery>, StorageError> {
        self.delivery_by_column("idempotency_key", idempotency_key)
            .await
    }

    async fn delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>, StorageError> {
        self.delivery_by_column("id", &id.0).await
    }

    async fn update_status(
        &self,
        id: &DeliveryId,
        status: DeliveryStatus,
        error: Option<String>,
        meta: Option<serde_json::Value>,
    ) -> Result<Delivery, StorageError> {
        let mut delivery = self
            .delivery(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("delivery {}", id.0)))?;

        if status == DeliveryStatus::Processing {
            delivery.attempts += 1;
        }
        delivery.status = status;
        delivery.error = error;
        delivery.meta = meta;
        delivery.updated_at_secs = now_secs();

        self.store_delivery(&delivery).await?;
        Ok(delivery)
    }

    async fn failed_deliveries(
        &self,
        tenant_id: &TenantId,
        max_age: Duration,
    ) -> Result<Vec<Delivery>, StorageError> {
        let rows = self
            .client
            .query(
                "SELECT payload FROM router_deliveries
                 WHERE tenant_id = $1 AND status = 'failed' AND created_at_secs >= $2
                 ORDER BY created_at_secs ASC, id ASC",
                &[&tenant_id.0, &window_cutoff(max_age)],
            )
            .await
            .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get(0).map_err(backend)?;
                serde_json::from_value(payload).map_err(backend)
            })
            .collect()
    }

    async fn tenants_with_failures(
        &self,
        max_age: Duration,
    ) -> Result<Vec<TenantId>, StorageError> {
        let rows = self
            .client
            .query(
                "SELECT DISTINCT tenant_id FROM router_deliveries
                 WHERE status = 'failed' AND created_at_secs >= $1
                 ORDER BY tenant_id ASC",
                &[&window_cutoff(max_age)],
            )
            .await
            .map_err(backend)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.try_get::<_, String>(0).ok())
            .map(TenantId)
            .collect())
    }
}
