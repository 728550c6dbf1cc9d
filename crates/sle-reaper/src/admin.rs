use std::sync::Arc;

use tracing::{info, warn};

use sle_bus::EventBus;
use sle_core::error::SleError;
use sle_core::types::{Block, PerformanceId, SeatEvent, SeatEventKind, SeatId, TenantId, TimestampMs};
use sle_shadow::ShadowStore;

/// Internal-only admin operations over seat blocks (spec §9.1). Not exposed
/// over the public HTTP surface — callers are operators, not ticket buyers.
pub struct AdminService {
    shadow: Arc<dyn ShadowStore>,
    bus: Arc<dyn EventBus>,
}

impl AdminService {
    pub fn new(shadow: Arc<dyn ShadowStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { shadow, bus }
    }

    pub async fn block_seat(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        reason: String,
        now_ms: TimestampMs,
    ) -> Result<(), SleError> {
        self.shadow
            .block_seat(&Block {
                tenant_id: tenant.clone(),
                performance_id: performance.clone(),
                seat_id: seat.clone(),
                reason,
                created_at: now_ms,
            })
            .await?;
        self.publish(tenant, performance, seat, SeatEventKind::Blocked, now_ms).await;
        info!(tenant = %tenant, performance = %performance, seat = %seat, "seat blocked");
        Ok(())
    }

    pub async fn unblock_seat(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        now_ms: TimestampMs,
    ) -> Result<(), SleError> {
        self.shadow.unblock_seat(tenant, performance, seat).await?;
        self.publish(tenant, performance, seat, SeatEventKind::Unblocked, now_ms).await;
        info!(tenant = %tenant, performance = %performance, seat = %seat, "seat unblocked");
        Ok(())
    }

    async fn publish(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        kind: SeatEventKind,
        now_ms: TimestampMs,
    ) {
        let sequence = self.bus.next_sequence(tenant, performance).await;
        let event = SeatEvent {
            tenant_id: tenant.clone(),
            performance_id: performance.clone(),
            seat_id: seat.clone(),
            kind,
            at: now_ms,
            sequence,
        };
        if let Err(e) = self.bus.publish(event).await {
            warn!(error = %e, "event bus publish failed, snapshot remains authoritative");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_bus::InProcessEventBus;
    use sle_shadow::MemoryShadowStore;

    #[tokio::test]
    async fn block_then_unblock_round_trips_and_emits_events() {
        let shadow = Arc::new(MemoryShadowStore::new());
        let bus = Arc::new(InProcessEventBus::new());
        let admin = AdminService::new(shadow.clone(), bus.clone());

        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let seat = SeatId("A1".into());

        let mut sub = bus.subscribe(&tenant, &perf).await;

        admin
            .block_seat(&tenant, &perf, &seat, "maintenance".into(), 0)
            .await
            .unwrap();
        assert!(shadow.get_block(&tenant, &perf, &seat).await.unwrap().is_some());

        admin.unblock_seat(&tenant, &perf, &seat, 1_000).await.unwrap();
        assert!(shadow.get_block(&tenant, &perf, &seat).await.unwrap().is_none());

        let blocked = sub.recv().await.unwrap();
        assert_eq!(blocked.kind, SeatEventKind::Blocked);
        let unblocked = sub.recv().await.unwrap();
        assert_eq!(unblocked.kind, SeatEventKind::Unblocked);
    }
}
