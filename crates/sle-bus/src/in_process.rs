use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use sle_core::error::SleError;
use sle_core::types::{PerformanceId, SeatEvent, TenantId};

use crate::port::{EventBus, EventSubscription};

/// Default ring buffer size per partition. A subscriber that falls this far
/// behind will see `Lagged` on its next `recv`.
const PARTITION_CAPACITY: usize = 1024;

struct Partition {
    sender: broadcast::Sender<SeatEvent>,
    sequence: AtomicU64,
}

/// In-process `EventBus`, one `tokio::sync::broadcast` channel per
/// (tenant, performance) partition, created lazily on first use. This is
/// the default bus for a single `sle-node` instance; multi-instance
/// deployments replace it with a broker-backed implementation that shares
/// the `EventBus` trait surface.
#[derive(Default)]
pub struct InProcessEventBus {
    partitions: Mutex<HashMap<(TenantId, PerformanceId), Arc<Partition>>>,
}

impl InProcessEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn partition(&self, tenant: &TenantId, performance: &PerformanceId) -> Arc<Partition> {
        let mut guard = self.partitions.lock().await;
        guard
            .entry((tenant.clone(), performance.clone()))
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(PARTITION_CAPACITY);
                Arc::new(Partition {
                    sender,
                    sequence: AtomicU64::new(0),
                })
            })
            .clone()
    }
}

#[async_trait]
impl EventBus for InProcessEventBus {
    async fn next_sequence(&self, tenant: &TenantId, performance: &PerformanceId) -> u64 {
        let partition = self.partition(tenant, performance).await;
        partition.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn publish(&self, event: SeatEvent) -> Result<(), SleError> {
        let partition = self
            .partition(&event.tenant_id, &event.performance_id)
            .await;
        // No receivers yet is not an error — availability streams are
        // opt-in and a publish with zero subscribers is routine.
        if let Err(broadcast::error::SendError(_)) = partition.sender.send(event) {
            debug!("published seat event with no active subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, tenant: &TenantId, performance: &PerformanceId) -> EventSubscription {
        let partition = self.partition(tenant, performance).await;
        EventSubscription::new(partition.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::types::{SeatEventKind, SeatId};

    fn event(tenant: &TenantId, performance: &PerformanceId, sequence: u64) -> SeatEvent {
        SeatEvent {
            tenant_id: tenant.clone(),
            performance_id: performance.clone(),
            seat_id: SeatId("A1".into()),
            kind: SeatEventKind::Locked,
            at: 0,
            sequence,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events_in_order() {
        let bus = InProcessEventBus::new();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());

        let mut sub = bus.subscribe(&tenant, &perf).await;
        bus.publish(event(&tenant, &perf, 1)).await.unwrap();
        bus.publish(event(&tenant, &perf, 2)).await.unwrap();

        assert_eq!(sub.recv().await.unwrap().sequence, 1);
        assert_eq!(sub.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn sequence_numbers_are_per_partition() {
        let bus = InProcessEventBus::new();
        let tenant = TenantId("t1".into());
        let perf_a = PerformanceId("p1".into());
        let perf_b = PerformanceId("p2".into());

        assert_eq!(bus.next_sequence(&tenant, &perf_a).await, 1);
        assert_eq!(bus.next_sequence(&tenant, &perf_a).await, 2);
        assert_eq!(bus.next_sequence(&tenant, &perf_b).await, 1);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = InProcessEventBus::new();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        bus.publish(event(&tenant, &perf, 1)).await.unwrap();
    }
}
