use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sle_bus::EventBus;
use sle_core::constants::{REAPER_GRACE_MS, REAPER_INTERVAL_MS};
use sle_core::types::{HoldEvent, HoldEventType, HoldState, SeatEvent, SeatEventKind, TimestampMs};
use sle_ledger::LockLedger;
use sle_shadow::ShadowStore;

/// Sweep cadence and grace period for the Expiry Reaper (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub grace: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(REAPER_INTERVAL_MS),
            grace: Duration::from_millis(REAPER_GRACE_MS),
        }
    }
}

/// Periodic sweep that reconciles holds whose ledger TTL has lazily lapsed
/// into an `EXPIRED` shadow row, and emits `seat.expired` for each seat.
pub struct ExpiryReaper {
    ledger: Arc<dyn LockLedger>,
    shadow: Arc<dyn ShadowStore>,
    bus: Arc<dyn EventBus>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(
        ledger: Arc<dyn LockLedger>,
        shadow: Arc<dyn ShadowStore>,
        bus: Arc<dyn EventBus>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            ledger,
            shadow,
            bus,
            config,
        }
    }

    /// Runs the sweep loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("expiry reaper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep(now_ms()).await;
                }
            }
        }
    }

    /// Runs a single sweep pass. Exposed directly so callers (and tests) can
    /// drive the Reaper without waiting on the interval.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: TimestampMs) {
        let cutoff = now - self.config.grace.as_millis() as TimestampMs;
        let reapable = match self.shadow.list_reapable_holds(cutoff).await {
            Ok(holds) => holds,
            Err(e) => {
                warn!(error = %e, "reaper: listing reapable holds failed, will retry next tick");
                return;
            }
        };

        for mut hold in reapable {
            let mut still_live = Vec::new();
            for seat in &hold.seats {
                match self.ledger.probe(&hold.tenant_id, &hold.performance_id, seat).await {
                    Ok(Some((version, _owner))) if version == hold.version => {
                        still_live.push(seat.clone());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, seat = %seat, "reaper: ledger probe failed, skipping hold this tick");
                        still_live.push(seat.clone());
                    }
                }
            }
            if !still_live.is_empty() {
                debug!(hold_id = %hold.hold_id, live = still_live.len(), "reaper: hold still has live seats, deferring");
                continue;
            }

            hold.state = HoldState::Expired;
            hold.updated_at = now;
            hold.events.push(HoldEvent {
                event_type: HoldEventType::Expired,
                at: now,
                note: None,
            });
            if let Err(e) = self.shadow.update_hold(&hold).await {
                warn!(error = %e, hold_id = %hold.hold_id, "reaper: failed to mark hold expired");
                continue;
            }

            for seat in &hold.seats {
                let sequence = self
                    .bus
                    .next_sequence(&hold.tenant_id, &hold.performance_id)
                    .await;
                let event = SeatEvent {
                    tenant_id: hold.tenant_id.clone(),
                    performance_id: hold.performance_id.clone(),
                    seat_id: seat.clone(),
                    kind: SeatEventKind::Expired,
                    at: now,
                    sequence,
                };
                if let Err(e) = self.bus.publish(event).await {
                    warn!(error = %e, "reaper: event bus publish failed, snapshot remains authoritative");
                }
            }
            info!(hold_id = %hold.hold_id, seats = hold.seats.len(), "hold expired");
        }
    }
}

fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_bus::InProcessEventBus;
    use sle_core::types::{Hold, HoldId, Owner, PerformanceId, SeatId, TenantId};
    use sle_ledger::MemoryLockLedger;
    use sle_shadow::MemoryShadowStore;

    fn reaper() -> (ExpiryReaper, Arc<MemoryLockLedger>, Arc<MemoryShadowStore>) {
        let ledger = Arc::new(MemoryLockLedger::new());
        let shadow = Arc::new(MemoryShadowStore::new());
        let bus = Arc::new(InProcessEventBus::new());
        (
            ExpiryReaper::new(ledger.clone(), shadow.clone(), bus, ReaperConfig::default()),
            ledger,
            shadow,
        )
    }

    fn hold(tenant: &TenantId, perf: &PerformanceId, seat: &SeatId, owner: &Owner, version: u64, expires_at: TimestampMs) -> Hold {
        Hold {
            hold_id: HoldId::new(),
            tenant_id: tenant.clone(),
            performance_id: perf.clone(),
            seats: vec![seat.clone()],
            owner: owner.clone(),
            version,
            expires_at,
            total_life_ms: 120_000,
            state: HoldState::Active,
            created_at: 0,
            updated_at: 0,
            events: vec![],
        }
    }

    /// S3: a hold whose ledger key has already lapsed (simulating a crash
    /// between the ledger TTL firing and the coordinator ever seeing it) is
    /// swept to `EXPIRED` on the next reaper tick, emitting exactly one
    /// `seat.expired` per seat.
    #[tokio::test]
    async fn s3_lazily_expired_ledger_entry_is_swept_to_expired() {
        let (reaper, ledger, shadow) = reaper();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let seat = SeatId("A1".into());
        let owner = Owner("o1".into());

        // Acquire with a TTL short enough that it has already lapsed by the
        // time the reaper runs.
        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner, 1, 10, 0)
            .await
            .unwrap();
        let h = hold(&tenant, &perf, &seat, &owner, 1, 10);
        shadow.insert_hold(&h).await.unwrap();

        reaper.sweep(100_000).await;

        let reloaded = shadow.get_hold(&tenant, h.hold_id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, HoldState::Expired);
    }

    #[tokio::test]
    async fn live_ledger_entry_is_not_reaped() {
        let (reaper, ledger, shadow) = reaper();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let seat = SeatId("A1".into());
        let owner = Owner("o1".into());

        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner, 1, 120_000, 0)
            .await
            .unwrap();
        let h = hold(&tenant, &perf, &seat, &owner, 1, 120_000);
        shadow.insert_hold(&h).await.unwrap();

        reaper.sweep(1_000).await;

        let reloaded = shadow.get_hold(&tenant, h.hold_id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, HoldState::Active);
    }
}
