use sha2::{Digest, Sha256};

use crate::types::{RecordId, RouteId, TenantId};

/// Derive the deduplication fingerprint for one (tenant, record, route)
/// triple.
///
/// Deterministic: identical inputs always produce the identical key, and
/// the SHA-256 digest makes distinct inputs collide only with negligible
/// probability. The key is scoped per route, not per action: a route
/// with several actions shares one key pattern, so only its first
/// action materializes a delivery row and the remaining actions dedup
/// against it. Widening the scope would change delivery semantics for
/// multi-action routes and is deliberately not done here.
pub fn idempotency_key(tenant_id: &TenantId, record_id: &RecordId, route_id: &RouteId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(record_id.0.as_bytes());
    hasher.update(b"|");
    hasher.update(route_id.0.as_bytes());
    hex::encode(hasher.finalize())
}
