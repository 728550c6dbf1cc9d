use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sle_core::error::SleError;
use sle_core::keys::seat_key;
use sle_core::types::{Owner, PerformanceId, SeatId, TenantId, TimestampMs, Version};

use crate::port::{AcquireOutcome, LockLedger, MutateOutcome};

#[derive(Clone)]
struct Entry {
    version: Version,
    owner: Owner,
    expires_at_ms: TimestampMs,
}

/// In-process `LockLedger` test double. Reproduces the four Lua scripts'
/// exact semantics over a `Mutex<HashMap>`, keyed by the same seat-key
/// grammar the Redis implementation uses, so callers can't tell which
/// implementation they're talking to from behavior alone.
///
/// TTL expiry is evaluated against an injectable clock rather than
/// `SystemTime::now()` so tests can advance time deterministically instead
/// of sleeping.
pub struct MemoryLockLedger {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Fn() -> TimestampMs + Send + Sync>,
}

impl MemoryLockLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as TimestampMs)
                .unwrap_or(0)
        }))
    }

    pub fn with_clock(clock: Arc<dyn Fn() -> TimestampMs + Send + Sync>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> TimestampMs {
        (self.clock)()
    }
}

impl Default for MemoryLockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockLedger for MemoryLockLedger {
    // `_now_ms` is accepted for trait parity but unused, same as the Redis
    // script's `ARGV[4]` — expiry bookkeeping uses this ledger's own clock
    // exclusively so stored and checked timestamps always share one base.
    async fn acquire_all_or_none(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seats: &[SeatId],
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
        _now_ms: TimestampMs,
    ) -> Result<AcquireOutcome, SleError> {
        let mut guard = self.entries.lock().await;
        let now = self.now();

        let mut conflicts = Vec::new();
        for seat in seats {
            let key = seat_key(tenant, performance, seat);
            if let Some(entry) = guard.get(&key) {
                let live = entry.expires_at_ms > now;
                if live && entry.owner != *owner {
                    conflicts.push(seat.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            return Ok(AcquireOutcome::Conflict(conflicts));
        }

        for seat in seats {
            let key = seat_key(tenant, performance, seat);
            guard.insert(
                key,
                Entry {
                    version,
                    owner: owner.clone(),
                    expires_at_ms: now + ttl_ms as i64,
                },
            );
        }
        Ok(AcquireOutcome::Ok)
    }

    async fn extend_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
    ) -> Result<MutateOutcome, SleError> {
        let mut guard = self.entries.lock().await;
        let now = self.now();
        let key = seat_key(tenant, performance, seat);

        match guard.get_mut(&key) {
            Some(entry) if entry.expires_at_ms > now && entry.version == version && entry.owner == *owner => {
                entry.expires_at_ms = now + ttl_ms as i64;
                Ok(MutateOutcome::Ok)
            }
            _ => Ok(MutateOutcome::Noop),
        }
    }

    async fn release_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        self.delete_if_owner(tenant, performance, seat, owner, version)
            .await
    }

    async fn rollback_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        self.delete_if_owner(tenant, performance, seat, owner, version)
            .await
    }

    async fn probe(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<(Version, Owner)>, SleError> {
        let guard = self.entries.lock().await;
        let now = self.now();
        let key = seat_key(tenant, performance, seat);
        Ok(guard
            .get(&key)
            .filter(|e| e.expires_at_ms > now)
            .map(|e| (e.version, e.owner.clone())))
    }
}

impl MemoryLockLedger {
    async fn delete_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError> {
        let mut guard = self.entries.lock().await;
        let now = self.now();
        let key = seat_key(tenant, performance, seat);

        match guard.get(&key) {
            Some(entry) if entry.expires_at_ms > now && entry.version == version && entry.owner == *owner => {
                guard.remove(&key);
                Ok(MutateOutcome::Ok)
            }
            _ => Ok(MutateOutcome::Noop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn ledger_at(now: i64) -> (MemoryLockLedger, Arc<AtomicI64>) {
        let clock = Arc::new(AtomicI64::new(now));
        let clock_for_closure = Arc::clone(&clock);
        let ledger = MemoryLockLedger::with_clock(Arc::new(move || clock_for_closure.load(Ordering::SeqCst)));
        (ledger, clock)
    }

    fn seats(ids: &[&str]) -> Vec<SeatId> {
        ids.iter().map(|s| SeatId(s.to_string())).collect()
    }

    #[tokio::test]
    async fn acquire_is_all_or_none_on_conflict() {
        let (ledger, _clock) = ledger_at(0);
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let owner_a = Owner("a".into());
        let owner_b = Owner("b".into());

        let outcome = ledger
            .acquire_all_or_none(&tenant, &perf, &seats(&["A1"]), &owner_a, 1, 120_000, 0)
            .await
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Ok);

        let outcome = ledger
            .acquire_all_or_none(
                &tenant,
                &perf,
                &seats(&["A1", "A2"]),
                &owner_b,
                2,
                120_000,
                0,
            )
            .await
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Conflict(seats(&["A1"])));

        // A2 must remain untouched by the failed acquire.
        assert!(ledger.probe(&tenant, &perf, &SeatId("A2".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_version_is_noop() {
        let (ledger, _clock) = ledger_at(0);
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let owner = Owner("a".into());
        let seat = SeatId("A1".into());

        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner, 5, 120_000, 0)
            .await
            .unwrap();

        let outcome = ledger
            .release_if_owner(&tenant, &perf, &seat, &owner, 4)
            .await
            .unwrap();
        assert_eq!(outcome, MutateOutcome::Noop);
        assert!(ledger.probe(&tenant, &perf, &seat).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expiry_makes_seat_available_again() {
        let (ledger, clock) = ledger_at(0);
        let tenant = TenantId("t1".into());
        let perf = PerformanceId("p1".into());
        let owner = Owner("a".into());
        let seat = SeatId("A1".into());

        ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner, 1, 1_000, 0)
            .await
            .unwrap();
        assert!(ledger.probe(&tenant, &perf, &seat).await.unwrap().is_some());

        clock.store(2_000, Ordering::SeqCst);
        assert!(ledger.probe(&tenant, &perf, &seat).await.unwrap().is_none());

        let owner2 = Owner("b".into());
        let outcome = ledger
            .acquire_all_or_none(&tenant, &perf, &[seat.clone()], &owner2, 2, 1_000, 2_000)
            .await
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Ok);
    }
}
