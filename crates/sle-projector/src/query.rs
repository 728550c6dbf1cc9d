use std::sync::Arc;

use sle_core::error::SleError;
use sle_core::types::{Owner, PerformanceId, SeatAvailability, SeatId, SeatStatus, TenantId};
use sle_ledger::LockLedger;
use sle_shadow::ShadowStore;

/// Read-side query over the Lock Ledger and Shadow Store, merged into a
/// single per-seat availability view (spec §4.4). Seatmap geometry is out
/// of scope — callers supply the seat ids they want resolved.
pub struct AvailabilityQuery {
    ledger: Arc<dyn LockLedger>,
    shadow: Arc<dyn ShadowStore>,
}

impl AvailabilityQuery {
    pub fn new(ledger: Arc<dyn LockLedger>, shadow: Arc<dyn ShadowStore>) -> Self {
        Self { ledger, shadow }
    }

    /// Resolves the status of one seat: `sold` takes precedence over
    /// `blocked`, which takes precedence over `held`, which falls back to
    /// `available`. `requester` lets the caller learn whether a `held` seat
    /// is their own hold.
    pub async fn seat_status(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        requester: Option<&Owner>,
    ) -> Result<SeatAvailability, SleError> {
        if self
            .shadow
            .list_sold(tenant, performance)
            .await?
            .iter()
            .any(|s| s.seat_id == *seat)
        {
            return Ok(SeatAvailability {
                seat_id: seat.clone(),
                status: SeatStatus::Sold,
                owner_self: None,
            });
        }

        if self.shadow.get_block(tenant, performance, seat).await?.is_some() {
            return Ok(SeatAvailability {
                seat_id: seat.clone(),
                status: SeatStatus::Blocked,
                owner_self: None,
            });
        }

        if let Some((_version, owner)) = self.ledger.probe(tenant, performance, seat).await? {
            return Ok(SeatAvailability {
                seat_id: seat.clone(),
                status: SeatStatus::Held,
                owner_self: requester.map(|r| *r == owner),
            });
        }

        Ok(SeatAvailability {
            seat_id: seat.clone(),
            status: SeatStatus::Available,
            owner_self: None,
        })
    }

    /// Snapshot(tenant, performance) for a set of seats. Eventually
    /// consistent at ledger-TTL granularity — a seat can show `held` for up
    /// to one TTL after its lock has actually lapsed, until the Reaper (or
    /// a fresh `probe`) catches up.
    pub async fn snapshot(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seats: &[SeatId],
        requester: Option<&Owner>,
    ) -> Result<Vec<SeatAvailability>, SleError> {
        let mut out = Vec::with_capacity(seats.len());
        for seat in seats {
            out.push(self.seat_status(tenant, performance, seat, requester).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sle_core::types::{Block, SoldRecord};
    use sle_ledger::MemoryLockLedger;
    use sle_shadow::MemoryShadowStore;

    fn query() -> (AvailabilityQuery, Arc<MemoryLockLedger>, Arc<MemoryShadowStore>) {
        let ledger = Arc::new(MemoryLockLedger::new());
        let shadow = Arc::new(MemoryShadowStore::new());
        (
            AvailabilityQuery::new(ledger.clone(), shadow.clone()),
            ledger,
            shadow,
        )
    }

    #[tokio::test]
    async fn status_precedence_sold_over_blocked_over_held() {
        let (query, ledger, shadow) = query();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let seat = SeatId("A1".into());

        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &Owner("o1".into()), 1, 120_000, 0)
            .await
            .unwrap();
        shadow
            .block_seat(&Block {
                tenant_id: tenant.clone(),
                performance_id: perf.clone(),
                seat_id: seat.clone(),
                reason: "maintenance".into(),
                created_at: 0,
            })
            .await
            .unwrap();
        shadow
            .insert_sold(&SoldRecord {
                tenant_id: tenant.clone(),
                performance_id: perf.clone(),
                seat_id: seat.clone(),
                order_id: "ORD1".into(),
            })
            .await
            .unwrap();

        let status = query.seat_status(&tenant, &perf, &seat, None).await.unwrap();
        assert_eq!(status.status, SeatStatus::Sold);
    }

    #[tokio::test]
    async fn held_seat_reports_owner_self() {
        let (query, ledger, _shadow) = query();
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let seat = SeatId("A1".into());
        let owner = Owner("o1".into());

        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner, 1, 120_000, 0)
            .await
            .unwrap();

        let mine = query
            .seat_status(&tenant, &perf, &seat, Some(&owner))
            .await
            .unwrap();
        assert_eq!(mine.status, SeatStatus::Held);
        assert_eq!(mine.owner_self, Some(true));

        let other = query
            .seat_status(&tenant, &perf, &seat, Some(&Owner("o2".into())))
            .await
            .unwrap();
        assert_eq!(other.owner_self, Some(false));
    }

    #[tokio::test]
    async fn unheld_unsold_unblocked_seat_is_available() {
        let (query, _ledger, _shadow) = query();
        let status = query
            .seat_status(&TenantId("t1".into()), &PerformanceId("p1".into()), &SeatId("Z9".into()), None)
            .await
            .unwrap();
        assert_eq!(status.status, SeatStatus::Available);
    }
}
