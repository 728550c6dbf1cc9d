use async_trait::async_trait;
use tokio::sync::broadcast;

use sle_core::error::SleError;
use sle_core::types::{PerformanceId, SeatEvent, TenantId};

/// A live subscription to one (tenant, performance) partition's change
/// stream. Wraps a `broadcast::Receiver` so callers never touch the
/// underlying channel type directly.
pub struct EventSubscription {
    rx: broadcast::Receiver<SeatEvent>,
}

impl EventSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<SeatEvent>) -> Self {
        Self { rx }
    }

    /// Awaits the next event. A `Lagged` channel overflow — the subscriber
    /// fell behind and the bus dropped the oldest unread events — surfaces
    /// as an error rather than silently skipping: callers are expected to
    /// fall back to a fresh Snapshot rather than trust a stream with a hole
    /// in it (spec §4.4's sequence-gap contract).
    pub async fn recv(&mut self) -> Result<SeatEvent, SleError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Closed) => {
                Err(SleError::Internal("event bus partition closed".into()))
            }
            Err(broadcast::error::RecvError::Lagged(n)) => Err(SleError::Internal(format!(
                "subscriber lagged by {n} events, resync via snapshot"
            ))),
        }
    }
}

/// Fan-out of ordered per-seat change events to availability-stream
/// subscribers (spec §4.5). Delivery is at-least-once within a partition;
/// consumers dedup on `(seat_id, sequence, kind)`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Allocates the next monotonic sequence number for a partition. Callers
    /// stamp the `SeatEvent` with this value before calling `publish`.
    async fn next_sequence(&self, tenant: &TenantId, performance: &PerformanceId) -> u64;

    async fn publish(&self, event: SeatEvent) -> Result<(), SleError>;

    async fn subscribe(&self, tenant: &TenantId, performance: &PerformanceId) -> EventSubscription;
}
