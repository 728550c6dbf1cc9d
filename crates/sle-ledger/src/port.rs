use async_trait::async_trait;
use sle_core::error::SleError;
use sle_core::types::{Owner, PerformanceId, SeatId, TenantId, TimestampMs, Version};

/// Result of `acquire_all_or_none`: either every seat transitioned to
/// owned-by-this-owner, or none did and the conflicting subset is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ok,
    Conflict(Vec<SeatId>),
}

/// Result of `extend_if_owner` / `release_if_owner` / `rollback_if_owner`:
/// the ownership/version guard either matched (and the mutation happened)
/// or it didn't, in which case nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutateOutcome {
    Ok,
    Noop,
}

/// The authoritative lock ledger: a KV store exposing four atomic,
/// server-side scripted operations over seat keys (spec §4.1).
///
/// Implementations must guarantee: `acquire_all_or_none` either writes every
/// key in `seats` or none of them; `now_ms` is supplied by the caller and
/// never consulted from the substrate's own clock; non-deterministic
/// transport/substrate errors are retried by the caller up to
/// `LEDGER_MAX_RETRIES` times, but `Conflict`/`Noop` outcomes never are.
#[async_trait]
pub trait LockLedger: Send + Sync {
    async fn acquire_all_or_none(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seats: &[SeatId],
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
        now_ms: TimestampMs,
    ) -> Result<AcquireOutcome, SleError>;

    async fn extend_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
        ttl_ms: u64,
    ) -> Result<MutateOutcome, SleError>;

    async fn release_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError>;

    /// Identical delete semantics to `release_if_owner`; kept as a distinct
    /// method so the Coordinator can distinguish "undo a partial Acquire"
    /// from "the caller released their hold" in logs and metrics.
    async fn rollback_if_owner(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
        owner: &Owner,
        version: Version,
    ) -> Result<MutateOutcome, SleError>;

    /// Read-only lookup used by the Expiry Reaper to confirm a lazily-expired
    /// key is really gone before it marks the shadow row `EXPIRED`. Returns
    /// `None` if the key is absent (including: TTL already elapsed).
    async fn probe(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<(Version, Owner)>, SleError>;
}
