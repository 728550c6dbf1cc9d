use async_trait::async_trait;

use sle_core::error::SleError;
use sle_core::types::{PerformanceId, SeatEvent, TenantId};

use crate::port::{EventBus, EventSubscription};

/// Placeholder for a shared-broker `EventBus` (e.g. NATS, Kafka) used when
/// `sle-node` runs as more than one instance and availability streams must
/// fan out across processes. `InProcessEventBus` cannot satisfy that case —
/// a `broadcast::Sender` only reaches subscribers in its own process.
///
/// No broker client is wired up; every call fails or returns an
/// already-closed stream rather than panicking. Exists so the Coordinator
/// and Projector can be written against `EventBus` without assuming a
/// single-node topology. `sle-node` never constructs this type.
pub struct BrokerEventBus;

#[async_trait]
impl EventBus for BrokerEventBus {
    async fn next_sequence(&self, _tenant: &TenantId, _performance: &PerformanceId) -> u64 {
        0
    }

    async fn publish(&self, _event: SeatEvent) -> Result<(), SleError> {
        Err(SleError::Internal(
            "BrokerEventBus has no backing transport configured".into(),
        ))
    }

    async fn subscribe(&self, _tenant: &TenantId, _performance: &PerformanceId) -> EventSubscription {
        // No broker client configured: hand back a subscription over an
        // already-closed channel so callers see a clean `Internal` error on
        // the first `recv()` instead of a panic.
        let (tx, rx) = tokio::sync::broadcast::channel(1);
        drop(tx);
        EventSubscription::new(rx)
    }
}
