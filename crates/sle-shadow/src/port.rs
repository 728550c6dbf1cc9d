use async_trait::async_trait;

use sle_core::error::SleError;
use sle_core::types::{
    Block, Hold, HoldId, PerformanceId, SeatId, SoldRecord, TenantId, TimestampMs, Version,
};

/// Result of checking an idempotency key against a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// Key unseen: the caller should proceed and then `record`.
    Fresh,
    /// Key seen before with an identical request hash: replay `response_json`
    /// verbatim rather than re-running the operation.
    Replay { response_json: String },
    /// Key reused with a different request body (spec §7 `IdempotencyMismatch`).
    Mismatch,
}

/// Durable, relational-shaped state: holds (plus their audit trail), admin
/// blocks, sold seats, and the idempotency registry. Everything here is
/// authoritative in a way the ephemeral Lock Ledger is not — a process can
/// rebuild its view of "what's sold" and "what's blocked" from this store
/// alone (spec §4.3).
///
/// Implementations must be tenant-isolated: no method may observe or mutate
/// rows belonging to a tenant other than the one named in its arguments.
#[async_trait]
pub trait ShadowStore: Send + Sync {
    /// Allocates the next version number for a (tenant, performance) pair.
    /// Monotonically increasing, never reused, even across process restarts.
    async fn allocate_version(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Version, SleError>;

    async fn insert_hold(&self, hold: &Hold) -> Result<(), SleError>;

    /// Overwrites a hold's mutable fields (state, expiry, total_life_ms,
    /// updated_at) and appends `new_event` to its audit trail in one
    /// transaction.
    async fn update_hold(&self, hold: &Hold) -> Result<(), SleError>;

    async fn get_hold(&self, tenant: &TenantId, hold_id: HoldId) -> Result<Option<Hold>, SleError>;

    /// Holds still `Active`/`Extended` whose `expires_at` is before `cutoff`.
    /// Feeds the Expiry Reaper's sweep (spec §4.6).
    async fn list_reapable_holds(&self, cutoff: TimestampMs) -> Result<Vec<Hold>, SleError>;

    async fn block_seat(&self, block: &Block) -> Result<(), SleError>;
    async fn unblock_seat(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<(), SleError>;
    async fn get_block(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
        seat: &SeatId,
    ) -> Result<Option<Block>, SleError>;
    async fn list_blocks(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<Block>, SleError>;

    async fn insert_sold(&self, record: &SoldRecord) -> Result<(), SleError>;
    async fn list_sold(
        &self,
        tenant: &TenantId,
        performance: &PerformanceId,
    ) -> Result<Vec<SoldRecord>, SleError>;

    /// Checks `key` against `request_hash` (a digest of the inbound request
    /// body). Returns `Fresh` the first time a key is seen, or once a prior
    /// record has aged past its TTL as of `now_ms`; callers must follow up
    /// with `record_idempotency` once the operation completes.
    async fn check_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        now_ms: TimestampMs,
    ) -> Result<IdempotencyCheck, SleError>;

    async fn record_idempotency(
        &self,
        tenant: &TenantId,
        key: &str,
        request_hash: &str,
        response_json: &str,
        ttl_hours: u64,
        now_ms: TimestampMs,
    ) -> Result<(), SleError>;
}
