use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use sle_bus::EventBus;
use sle_core::error::SleError;
use sle_core::types::{
    Hold, HoldEvent, HoldEventType, HoldId, HoldState, SeatEventKind, SeatId, SoldRecord,
    TimestampMs,
};
use sle_core::Config;
use sle_ledger::{AcquireOutcome, LockLedger, MutateOutcome};
use sle_shadow::{IdempotencyCheck, ShadowStore};

use crate::rate_limit::RateLimiter;
use crate::requests::{
    AcquireRequest, ConvertRequest, ExtendRequest, ExtendResult, ReleaseRequest, ReleaseResult,
    RollbackRequest,
};

/// Orchestrates the five hold operations over the Lock Ledger, Shadow
/// Store, and Event Bus ports (spec §4.2). Stateless aside from its shared
/// adapters — re-entrant, safe to call concurrently from many workers.
pub struct HoldCoordinator {
    ledger: Arc<dyn LockLedger>,
    shadow: Arc<dyn ShadowStore>,
    bus: Arc<dyn EventBus>,
    rate_limiter: Arc<dyn RateLimiter>,
    config: Config,
}

impl HoldCoordinator {
    pub fn new(
        ledger: Arc<dyn LockLedger>,
        shadow: Arc<dyn ShadowStore>,
        bus: Arc<dyn EventBus>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: Config,
    ) -> Self {
        Self {
            ledger,
            shadow,
            bus,
            rate_limiter,
            config,
        }
    }

    #[instrument(skip(self, request), fields(tenant = %request.tenant, performance = %request.performance))]
    pub async fn acquire(&self, request: AcquireRequest, now_ms: TimestampMs) -> Result<Hold, SleError> {
        self.rate_limiter
            .check(&request.tenant, &request.owner, now_ms)
            .await?;
        validate_acquire(&request, &self.config)?;

        let request_hash = hash_request(&request);
        match self
            .shadow
            .check_idempotency(&request.tenant, &request.idempotency_key, &request_hash, now_ms)
            .await?
        {
            IdempotencyCheck::Replay { response_json } => {
                return serde_json::from_str(&response_json)
                    .map_err(|e| SleError::Internal(format!("corrupt idempotency record: {e}")));
            }
            IdempotencyCheck::Mismatch => return Err(SleError::IdempotencyMismatch),
            IdempotencyCheck::Fresh => {}
        }

        let sold: HashSet<SeatId> = self
            .shadow
            .list_sold(&request.tenant, &request.performance)
            .await?
            .into_iter()
            .map(|s| s.seat_id)
            .collect();

        let mut conflicts = Vec::new();
        for seat in &request.seats {
            let blocked = self
                .shadow
                .get_block(&request.tenant, &request.performance, seat)
                .await?
                .is_some();
            if blocked || sold.contains(seat) {
                conflicts.push(seat.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(SleError::conflict(conflicts));
        }

        let version = self
            .shadow
            .allocate_version(&request.tenant, &request.performance)
            .await?;

        let outcome = self
            .ledger
            .acquire_all_or_none(
                &request.tenant,
                &request.performance,
                &request.seats,
                &request.owner,
                version,
                request.ttl_ms,
                now_ms,
            )
            .await?;

        let conflict_seats = match outcome {
            AcquireOutcome::Conflict(seats) => Some(seats),
            AcquireOutcome::Ok => None,
        };
        if let Some(seats) = conflict_seats {
            return Err(SleError::conflict(seats));
        }

        let hold = Hold {
            hold_id: HoldId::new(),
            tenant_id: request.tenant.clone(),
            performance_id: request.performance.clone(),
            seats: request.seats.clone(),
            owner: request.owner.clone(),
            version,
            expires_at: now_ms + request.ttl_ms as i64,
            total_life_ms: request.ttl_ms as i64,
            state: HoldState::Active,
            created_at: now_ms,
            updated_at: now_ms,
            events: vec![HoldEvent {
                event_type: HoldEventType::Created,
                at: now_ms,
                note: None,
            }],
        };

        if let Err(e) = self.shadow.insert_hold(&hold).await {
            warn!(error = %e, hold_id = %hold.hold_id, "shadow write failed after ledger acquire, rolling back");
            for seat in &request.seats {
                if let Err(rollback_err) = self
                    .ledger
                    .rollback_if_owner(&request.tenant, &request.performance, seat, &request.owner, version)
                    .await
                {
                    warn!(error = %rollback_err, seat = %seat, "best-effort ledger rollback failed");
                }
            }
            return Err(SleError::StorageError(e.to_string()));
        }

        for seat in &request.seats {
            let sequence = self.bus.next_sequence(&request.tenant, &request.performance).await;
            self.publish_event(&hold, seat.clone(), SeatEventKind::Locked, now_ms, sequence)
                .await;
        }

        let response_json = serde_json::to_string(&hold)
            .map_err(|e| SleError::Internal(format!("hold serialization: {e}")))?;
        self.shadow
            .record_idempotency(
                &request.tenant,
                &request.idempotency_key,
                &request_hash,
                &response_json,
                self.config.idempotency_ttl_hours,
                now_ms,
            )
            .await?;

        info!(hold_id = %hold.hold_id, seats = hold.seats.len(), "hold acquired");
        Ok(hold)
    }

    #[instrument(skip(self, request), fields(hold_id = %request.hold_id))]
    pub async fn extend(&self, request: ExtendRequest, now_ms: TimestampMs) -> Result<ExtendResult, SleError> {
        let mut hold = self
            .shadow
            .get_hold(&request.tenant, request.hold_id)
            .await?
            .ok_or_else(|| SleError::NotFound(request.hold_id.to_string()))?;

        if hold.owner != request.owner || hold.version != request.version {
            return Err(SleError::stale(hold.seats.clone()));
        }
        if !matches!(hold.state, HoldState::Active | HoldState::Extended) {
            return Err(SleError::stale(hold.seats.clone()));
        }
        if hold.total_life_ms + request.additional_ms > self.config.hold_ttl_ms_max as i64 {
            return Err(SleError::stale(hold.seats.clone()));
        }

        let new_expires_at = hold.expires_at + request.additional_ms;
        let new_ttl_ms = (new_expires_at - now_ms).max(0) as u64;

        let mut failed = Vec::new();
        for seat in &hold.seats {
            let outcome = self
                .ledger
                .extend_if_owner(
                    &request.tenant,
                    &hold.performance_id,
                    seat,
                    &request.owner,
                    request.version,
                    new_ttl_ms,
                )
                .await?;
            if outcome == MutateOutcome::Noop {
                failed.push(seat.clone());
            }
        }
        if !failed.is_empty() {
            return Err(SleError::stale(failed));
        }

        hold.expires_at = new_expires_at;
        hold.total_life_ms += request.additional_ms;
        hold.state = HoldState::Extended;
        hold.updated_at = now_ms;
        hold.events.push(HoldEvent {
            event_type: HoldEventType::Extended,
            at: now_ms,
            note: None,
        });
        self.shadow.update_hold(&hold).await?;

        Ok(ExtendResult {
            expires_at: hold.expires_at,
        })
    }

    #[instrument(skip(self, request), fields(hold_id = %request.hold_id))]
    pub async fn release(&self, request: ReleaseRequest, now_ms: TimestampMs) -> Result<ReleaseResult, SleError> {
        let mut hold = self
            .shadow
            .get_hold(&request.tenant, request.hold_id)
            .await?
            .ok_or_else(|| SleError::NotFound(request.hold_id.to_string()))?;

        let mut released_seats = Vec::new();
        for seat in &hold.seats {
            let outcome = self
                .ledger
                .release_if_owner(&request.tenant, &hold.performance_id, seat, &request.owner, request.version)
                .await?;
            match outcome {
                MutateOutcome::Ok => released_seats.push(seat.clone()),
                MutateOutcome::Noop => {
                    warn!(seat = %seat, hold_id = %hold.hold_id, "release no-op: stale version or already gone");
                }
            }
        }

        if !released_seats.is_empty() && hold.version == request.version {
            hold.state = HoldState::Released;
            hold.updated_at = now_ms;
            hold.events.push(HoldEvent {
                event_type: HoldEventType::Released,
                at: now_ms,
                note: request.reason.clone(),
            });
            self.shadow.update_hold(&hold).await?;

            for seat in &released_seats {
                let sequence = self.bus.next_sequence(&request.tenant, &hold.performance_id).await;
                self.publish_event(&hold, seat.clone(), SeatEventKind::Released, now_ms, sequence)
                    .await;
            }
        }

        Ok(ReleaseResult { released_seats })
    }

    /// Identical ledger-side semantics to `release`, reserved for internal
    /// callers compensating a partial acquire. Never publishes
    /// `seat.released` — the hold is treated as if it never existed.
    #[instrument(skip(self, request), fields(hold_id = %request.hold_id))]
    pub async fn rollback(&self, request: RollbackRequest, now_ms: TimestampMs) -> Result<ReleaseResult, SleError> {
        let mut hold = self
            .shadow
            .get_hold(&request.tenant, request.hold_id)
            .await?
            .ok_or_else(|| SleError::NotFound(request.hold_id.to_string()))?;

        let mut released_seats = Vec::new();
        for seat in &hold.seats {
            let outcome = self
                .ledger
                .rollback_if_owner(&request.tenant, &hold.performance_id, seat, &request.owner, request.version)
                .await?;
            if outcome == MutateOutcome::Ok {
                released_seats.push(seat.clone());
            }
        }

        if !released_seats.is_empty() && hold.version == request.version {
            hold.state = HoldState::Released;
            hold.updated_at = now_ms;
            hold.events.push(HoldEvent {
                event_type: HoldEventType::RolledBack,
                at: now_ms,
                note: None,
            });
            self.shadow.update_hold(&hold).await?;
        }

        Ok(ReleaseResult { released_seats })
    }

    #[instrument(skip(self, request), fields(hold_id = %request.hold_id))]
    pub async fn convert(&self, request: ConvertRequest, now_ms: TimestampMs) -> Result<Hold, SleError> {
        let request_hash = hash_convert_request(&request);
        match self
            .shadow
            .check_idempotency(&request.tenant, &request.idempotency_key, &request_hash, now_ms)
            .await?
        {
            IdempotencyCheck::Replay { response_json } => {
                return serde_json::from_str(&response_json)
                    .map_err(|e| SleError::Internal(format!("corrupt idempotency record: {e}")));
            }
            IdempotencyCheck::Mismatch => return Err(SleError::IdempotencyMismatch),
            IdempotencyCheck::Fresh => {}
        }

        let mut hold = self
            .shadow
            .get_hold(&request.tenant, request.hold_id)
            .await?
            .ok_or_else(|| SleError::NotFound(request.hold_id.to_string()))?;

        if hold.owner != request.owner
            || hold.version != request.version
            || !matches!(hold.state, HoldState::Active | HoldState::Extended)
        {
            return Err(SleError::stale(hold.seats.clone()));
        }

        for seat in &hold.seats {
            self.shadow
                .insert_sold(&SoldRecord {
                    tenant_id: request.tenant.clone(),
                    performance_id: hold.performance_id.clone(),
                    seat_id: seat.clone(),
                    order_id: request.order_id.clone(),
                })
                .await?;
        }

        for seat in &hold.seats {
            // Best-effort: the sold record is already durable and
            // authoritative; a stray ledger key is swept by the Reaper.
            if let Err(e) = self
                .ledger
                .release_if_owner(&request.tenant, &hold.performance_id, seat, &request.owner, request.version)
                .await
            {
                warn!(error = %e, seat = %seat, "ledger cleanup after convert failed, reaper will sweep");
            }
        }

        hold.state = HoldState::Converted;
        hold.updated_at = now_ms;
        hold.events.push(HoldEvent {
            event_type: HoldEventType::Converted,
            at: now_ms,
            note: Some(request.order_id.clone()),
        });
        self.shadow.update_hold(&hold).await?;

        for seat in &hold.seats {
            let sequence = self.bus.next_sequence(&request.tenant, &hold.performance_id).await;
            self.publish_event(&hold, seat.clone(), SeatEventKind::Sold, now_ms, sequence)
                .await;
        }

        let response_json = serde_json::to_string(&hold)
            .map_err(|e| SleError::Internal(format!("hold serialization: {e}")))?;
        self.shadow
            .record_idempotency(
                &request.tenant,
                &request.idempotency_key,
                &request_hash,
                &response_json,
                self.config.idempotency_ttl_hours,
                now_ms,
            )
            .await?;

        Ok(hold)
    }

    async fn publish_event(
        &self,
        hold: &Hold,
        seat_id: SeatId,
        kind: SeatEventKind,
        at: TimestampMs,
        sequence: u64,
    ) {
        let event = sle_core::types::SeatEvent {
            tenant_id: hold.tenant_id.clone(),
            performance_id: hold.performance_id.clone(),
            seat_id,
            kind,
            at,
            sequence,
        };
        if let Err(e) = self.bus.publish(event).await {
            warn!(error = %e, "event bus publish failed, snapshot remains authoritative");
        }
    }
}

fn validate_acquire(request: &AcquireRequest, config: &Config) -> Result<(), SleError> {
    if request.seats.is_empty() {
        return Err(SleError::Validation("seats must not be empty".into()));
    }
    if request.seats.len() > config.hold_max_seats_per_request {
        return Err(SleError::Validation(format!(
            "at most {} seats per request",
            config.hold_max_seats_per_request
        )));
    }
    let unique: HashSet<&SeatId> = request.seats.iter().collect();
    if unique.len() != request.seats.len() {
        return Err(SleError::Validation("duplicate seat ids".into()));
    }
    if request.ttl_ms == 0 || request.ttl_ms > config.hold_ttl_ms_max {
        return Err(SleError::Validation(format!(
            "ttl_ms must be in [1, {}]",
            config.hold_ttl_ms_max
        )));
    }
    if request.owner.0.len() > config.hold_owner_id_max_length {
        return Err(SleError::Validation("owner id too long".into()));
    }
    Ok(())
}

fn hash_request(request: &AcquireRequest) -> String {
    let canonical = serde_json::to_vec(request).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

fn hash_convert_request(request: &ConvertRequest) -> String {
    let canonical = serde_json::to_vec(request).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use sle_bus::InProcessEventBus;
    use sle_core::types::{Owner, PerformanceId, TenantId};
    use sle_ledger::MemoryLockLedger;
    use sle_shadow::MemoryShadowStore;

    use crate::rate_limit::FixedWindowRateLimiter;

    fn test_config() -> Config {
        Config {
            redis_url: "redis://unused".into(),
            database_url: "postgres://unused".into(),
            http_listen_addr: "0.0.0.0:0".parse::<SocketAddr>().unwrap(),
            hold_ttl_ms_default: 120_000,
            hold_ttl_ms_max: 300_000,
            hold_max_seats_per_request: 25,
            hold_owner_id_max_length: 128,
            idempotency_ttl_hours: 24,
            ledger_command_timeout_ms: 50,
            rate_limit_burst: 10,
            rate_limit_window_secs: 60,
        }
    }

    fn coordinator() -> HoldCoordinator {
        HoldCoordinator::new(
            Arc::new(MemoryLockLedger::new()),
            Arc::new(MemoryShadowStore::new()),
            Arc::new(InProcessEventBus::new()),
            Arc::new(FixedWindowRateLimiter::new(100, 60)),
            test_config(),
        )
    }

    fn acquire_req(owner: &str, seats: &[&str], idem_key: &str) -> AcquireRequest {
        AcquireRequest {
            tenant: TenantId("t1".into()),
            performance: PerformanceId("p1".into()),
            seats: seats.iter().map(|s| SeatId(s.to_string())).collect(),
            owner: Owner(owner.into()),
            ttl_ms: 120_000,
            idempotency_key: idem_key.into(),
        }
    }

    /// S1: overlapping acquire conflicts on exactly the shared seat; the
    /// non-overlapping seat in the losing request remains available.
    #[tokio::test]
    async fn s1_overlapping_acquire_conflicts_on_shared_seat_only() {
        let c = coordinator();
        let hold = c.acquire(acquire_req("o1", &["A1", "A2", "A3"], "k1"), 0).await.unwrap();
        assert_eq!(hold.seats.len(), 3);

        let err = c
            .acquire(acquire_req("o2", &["A3", "A4"], "k2"), 1)
            .await
            .unwrap_err();
        match err {
            SleError::Conflict { conflict_seat_ids } => {
                assert_eq!(conflict_seat_ids, vec![SeatId("A3".into())]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        // A4 must still be acquirable by anyone.
        let hold2 = c.acquire(acquire_req("o2", &["A4"], "k3"), 2).await.unwrap();
        assert_eq!(hold2.seats, vec![SeatId("A4".into())]);
    }

    /// S2: a second extend that would exceed the max total life is rejected
    /// without mutating the hold.
    #[tokio::test]
    async fn s2_extend_beyond_max_life_is_rejected() {
        let c = coordinator();
        let hold = c.acquire(acquire_req("o1", &["B1"], "k1"), 0).await.unwrap();

        let extended = c
            .extend(
                ExtendRequest {
                    tenant: TenantId("t1".into()),
                    hold_id: hold.hold_id,
                    owner: Owner("o1".into()),
                    version: hold.version,
                    additional_ms: 60_000,
                },
                100_000,
            )
            .await
            .unwrap();
        assert_eq!(extended.expires_at, 180_000);

        let err = c
            .extend(
                ExtendRequest {
                    tenant: TenantId("t1".into()),
                    hold_id: hold.hold_id,
                    owner: Owner("o1".into()),
                    version: hold.version,
                    additional_ms: 300_000,
                },
                150_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SleError::Stale { .. }));
    }

    /// S4: converting a hold transitions its seats to sold; a subsequent
    /// acquire on a sold seat conflicts; replaying Convert with the same
    /// idempotency key returns the same result, a different order id
    /// mismatches.
    #[tokio::test]
    async fn s4_convert_then_conflict_then_idempotent_replay() {
        let c = coordinator();
        let hold = c.acquire(acquire_req("o1", &["C1"], "k1"), 0).await.unwrap();

        let convert_req = ConvertRequest {
            tenant: TenantId("t1".into()),
            hold_id: hold.hold_id,
            owner: Owner("o1".into()),
            version: hold.version,
            order_id: "ORD1".into(),
            idempotency_key: "conv-1".into(),
        };
        let converted = c.convert(convert_req.clone(), 1_000).await.unwrap();
        assert_eq!(converted.state, HoldState::Converted);

        let err = c
            .acquire(acquire_req("o2", &["C1"], "k-other"), 2_000)
            .await
            .unwrap_err();
        assert!(matches!(err, SleError::Conflict { .. }));

        let replay = c.convert(convert_req.clone(), 3_000).await.unwrap();
        assert_eq!(replay.hold_id, converted.hold_id);

        let mut mismatched = convert_req;
        mismatched.order_id = "ORD2".into();
        let err = c.convert(mismatched, 4_000).await.unwrap_err();
        assert!(matches!(err, SleError::IdempotencyMismatch));
    }

    /// S5: duplicate seat ids in one request are rejected before the ledger
    /// is touched.
    #[tokio::test]
    async fn s5_duplicate_seats_rejected() {
        let c = coordinator();
        let err = c
            .acquire(acquire_req("o1", &["D1", "D1", "D2"], "k1"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SleError::Validation(_)));
    }

    /// Invariant 4: release then re-acquire round-trips to available.
    #[tokio::test]
    async fn release_then_reacquire_round_trips() {
        let c = coordinator();
        let hold = c.acquire(acquire_req("o1", &["E1"], "k1"), 0).await.unwrap();

        let release = c
            .release(
                ReleaseRequest {
                    tenant: TenantId("t1".into()),
                    hold_id: hold.hold_id,
                    owner: Owner("o1".into()),
                    version: hold.version,
                    reason: None,
                },
                1_000,
            )
            .await
            .unwrap();
        assert_eq!(release.released_seats, vec![SeatId("E1".into())]);

        let reacquired = c.acquire(acquire_req("o2", &["E1"], "k2"), 2_000).await.unwrap();
        assert_eq!(reacquired.seats, vec![SeatId("E1".into())]);
    }

    /// Invariant 5: identical body + idempotency key replays the same
    /// response without mutating state twice.
    #[tokio::test]
    async fn idempotent_acquire_replays_identical_response() {
        let c = coordinator();
        let first = c.acquire(acquire_req("o1", &["F1"], "dup-key"), 0).await.unwrap();
        let second = c.acquire(acquire_req("o1", &["F1"], "dup-key"), 5_000).await.unwrap();
        assert_eq!(first.hold_id, second.hold_id);
        assert_eq!(first.version, second.version);
    }
}
