use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sle_core::error::SleError;
use sle_core::types::{
    Block, Hold, HoldId, HoldState, PerformanceId, SeatId, SoldRecord, TenantId, TimestampMs,
    Version,
};

use crate::port::{IdempotencyCheck, ShadowStore};

#[derive(Default)]
struct State {
    holds: HashMap<(TenantId, HoldId), Hold>,
    blocks: HashMap<(TenantId, PerformanceId, SeatId), Block>,
    sold: HashMap<(TenantId, PerformanceId, SeatId), SoldRecord>,
    idempotency: HashMap<(TenantId, String), IdempotencyRow>,
    versions: HashMap<(TenantId, PerformanceId), Version>,
}

struct IdempotencyRow {
    request_hash: String,
    response_json: String,
    expires_at_ms: TimestampMs,
}

/// In-process `ShadowStore` test double, used by the Coordinator's and
/// Reaper's own unit tests and by `sle-node` in local-dev mode when no
/// `DATABASE_URL` is configured.
#[derive(Default)]
pub struct MemoryShadowStore {
    state: Mutex<State>,
}

impl MemoryShadowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShadowStore for MemoryShadowStore {
    async fn allocate_version(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Version, SleError> {
        let mut state = self.state.lock().await;
        let counter = state
            .versions
            .entry((tenant.clone(), performance.clone()))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_hold(&self, hold: &Hold) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        state
            .holds
            .insert((hold.tenant_id.clone(), hold.hold_id), hold.clone());
        Ok(())
    }

    async fn update_hold(&self, hold: &Hold) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        let key = (hold.tenant_id.clone(), hold.hold_id);
        if !state.holds.contains_key(&key) {
            return Err(SleError::NotFound(hold.hold_id.to_string()));
        }
        state.holds.insert(key, hold.clone());
        Ok(())
    }

    async fn get_hold(&self, tenant: &TenantId, hold_id: HoldId) -> Result<Option<Hold>, SleError> {
        let state = self.state.lock().await;
        Ok(state.holds.get(&(tenant.clone(), hold_id)).cloned())
    }

    async fn list_reapable_holds(&self, cutoff: TimestampMs) -> Result<Vec<Hold>, SleError> {
        let state = self.state.lock().await;
        Ok(state
            .holds
            .values()
            .filter(|h| {
                matches!(h.state, HoldState::Active | HoldState::Extended) && h.expires_at < cutoff
            })
            .cloned()
            .collect())
    }

    async fn block_seat(&self, block: &Block) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        state.blocks.insert(
            (
                block.tenant_id.clone(),
                block.performance_id.clone(),
                block.seat_id.clone(),
            ),
            block.clone(),
        );
        Ok(())
    }

    async fn unblock_seat(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        state
            .blocks
            .remove(&(tenant.clone(), performance.clone(), seat.clone()));
        Ok(())
    }

    async fn get_block(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<Block>, SleError> {
        let state = self.state.lock().await;
        Ok(state
            .blocks
            .get(&(tenant.clone(), performance.clone(), seat.clone()))
            .cloned())
    }

    async fn list_blocks(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<Block>, SleError> {
        let state = self.state.lock().await;
        Ok(state
            .blocks
            .values()
            .filter(|b| b.tenant_id == *tenant && b.performance_id == *performance)
            .cloned()
            .collect())
    }

    async fn insert_sold(&self, record: &SoldRecord) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        state.sold.insert(
            (
                record.tenant_id.clone(),
                record.performance_id.clone(),
                record.seat_id.clone(),
            ),
            record.clone(),
        );
        Ok(())
    }

    async fn list_sold(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<SoldRecord>, SleError> {
        let state = self.state.lock().await;
        Ok(state
            .sold
            .values()
            .filter(|s| s.tenant_id == *tenant && s.performance_id == *performance)
            .cloned()
            .collect())
    }

    async fn check_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        now_ms: TimestampMs,
    ) -> Result<IdempotencyCheck, SleError> {
        let state = self.state.lock().await;
        match state.idempotency.get(&(tenant.clone(), key.to_string())) {
            None => Ok(IdempotencyCheck::Fresh),
            Some(row) if row.expires_at_ms <= now_ms => Ok(IdempotencyCheck::Fresh),
            Some(row) if row.request_hash == request_hash => Ok(IdempotencyCheck::Replay {
                response_json: row.response_json.clone(),
            }),
            Some(_) => Ok(IdempotencyCheck::Mismatch),
        }
    }

    async fn record_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        response_json: &str,
        ttl_hours: u64,
        now_ms: TimestampMs,
    ) -> Result<(), SleError> {
        let mut state = self.state.lock().await;
        state.idempotency.insert(
            (tenant.clone(), key.to_string()),
            IdempotencyRow {
                request_hash: request_hash.to_string(),
                response_json: response_json.to_string(),
                expires_at_ms: now_ms + ttl_hours as i64 * 3_600_000,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::types::{HoldId, Owner};

    fn hold(tenant: &str, perf: &str, state: HoldState) -> Hold {
        Hold {
            hold_id: HoldId::new(),
            tenant_id: TenantId(tenant.into()),
            performance_id: PerformanceId(perf.into()),
            seats: vec![SeatId("A1".into())],
            owner: Owner("owner-1".into()),
            version: 1,
            expires_at: 1_000,
            total_life_ms: 120_000,
            state,
            created_at: 0,
            updated_at: 0,
            events: vec![],
        }
    }

    #[tokio::test]
    async fn allocate_version_is_monotonic_per_performance() {
        let store = MemoryShadowStore::new();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let other = PerformanceId("p2".into());

        assert_eq!(store.allocate_version(&tenant, &perf).await.unwrap(), 1);
        assert_eq!(store.allocate_version(&tenant, &perf).await.unwrap(), 2);
        assert_eq!(store.allocate_version(&tenant, &other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_reapable_holds_filters_on_state_and_cutoff() {
        let store = MemoryShadowStore::new();
        let active = hold("t1", "p1", HoldState::Active);
        let released = hold("t1", "p1", HoldState::Released);
        store.insert_hold(&active).await.unwrap();
        store.insert_hold(&released).await.unwrap();

        let reapable = store.list_reapable_holds(5_000).await.unwrap();
        assert_eq!(reapable.len(), 1);
        assert_eq!(reapable[0].hold_id, active.hold_id);
    }

    #[tokio::test]
    async fn idempotency_replay_vs_mismatch() {
        let store = MemoryShadowStore::new();
        let tenant = TenantId("t1".into());

        assert_eq!(
            store.check_idempotency(&tenant, "k1", "hash-a", 0).await.unwrap(),
            IdempotencyCheck::Fresh
        );
        store
            .record_idempotency(&tenant, "k1", "hash-a", "{\"ok\":true}", 24, 0)
            .await
            .unwrap();

        assert_eq!(
            store.check_idempotency(&tenant, "k1", "hash-a", 1_000).await.unwrap(),
            IdempotencyCheck::Replay {
                response_json: "{\"ok\":true}".into()
            }
        );
        assert_eq!(
            store.check_idempotency(&tenant, "k1", "hash-b", 1_000).await.unwrap(),
            IdempotencyCheck::Mismatch
        );
    }

    #[tokio::test]
    async fn idempotency_record_is_fresh_again_after_ttl_elapses() {
        let store = MemoryShadowStore::new();
        let tenant = TenantId("t1".into());

        store
            .record_idempotency(&tenant, "k1", "hash-a", "{\"ok\":true}", 1, 0)
            .await
            .unwrap();

        let one_hour_ms = 3_600_000;
        assert_eq!(
            store
                .check_idempotency(&tenant, "k1", "hash-a", one_hour_ms - 1)
                .await
                .unwrap(),
            IdempotencyCheck::Replay {
                response_json: "{\"ok\":true}".into()
            }
        );
        assert_eq!(
            store
                .check_idempotency(&tenant, "k1", "hash-b", one_hour_ms + 1)
                .await
                .unwrap(),
            IdempotencyCheck::Fresh
        );
    }
}
