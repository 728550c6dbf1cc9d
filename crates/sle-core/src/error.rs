use thiserror::Error;

use crate::types::SeatId;

/// The error taxonomy for the Seat Lock Engine (spec §7). Every mutating
/// operation on the `LockLedger`, `ShadowStore`, or Hold Coordinator resolves
/// to one of these; `sle-api` maps each variant to its Problem Details form.
#[derive(Debug, Error)]
pub enum SleError {
    // ── Validation ────────────────────────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    // ── Conflict ──────────────────────────────────────────────────────────────
    #[error("{} seat(s) unavailable", conflict_seat_ids.len())]
    Conflict { conflict_seat_ids: Vec<SeatId> },

    // ── Stale fencing token ───────────────────────────────────────────────────
    #[error("fencing token stale or expired for {} seat(s)", seats.len())]
    Stale { seats: Vec<SeatId> },

    // ── Not found ─────────────────────────────────────────────────────────────
    #[error("hold not found: {0}")]
    NotFound(String),

    // ── Idempotency ───────────────────────────────────────────────────────────
    #[error("idempotency key reused with a different request body")]
    IdempotencyMismatch,

    // ── Rate limiting ─────────────────────────────────────────────────────────
    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    // ── Timeout ───────────────────────────────────────────────────────────────
    #[error("operation timed out")]
    Timeout,

    // ── Storage ───────────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    StorageError(String),

    // ── Internal invariant violation ──────────────────────────────────────────
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl SleError {
    pub fn conflict(seats: Vec<SeatId>) -> Self {
        Self::Conflict {
            conflict_seat_ids: seats,
        }
    }

    pub fn stale(seats: Vec<SeatId>) -> Self {
        Self::Stale { seats }
    }
}
