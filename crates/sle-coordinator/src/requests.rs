use serde::{Deserialize, Serialize};

use sle_core::types::{HoldId, Owner, PerformanceId, SeatId, TenantId, TimestampMs, Version};

#[derive(Debug, Clone, Serialize)]
pub struct AcquireRequest {
    pub tenant: TenantId,
    pub performance: PerformanceId,
    pub seats: Vec<SeatId>,
    pub owner: Owner,
    pub ttl_ms: u64,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct ExtendRequest {
    pub tenant: TenantId,
    pub hold_id: HoldId,
    pub owner: Owner,
    pub version: Version,
    pub additional_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub tenant: TenantId,
    pub hold_id: HoldId,
    pub owner: Owner,
    pub version: Version,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub tenant: TenantId,
    pub hold_id: HoldId,
    pub owner: Owner,
    pub version: Version,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertRequest {
    pub tenant: TenantId,
    pub hold_id: HoldId,
    pub owner: Owner,
    pub version: Version,
    pub order_id: String,
    pub idempotency_key: String,
}

/// Response to a successful Extend: the hold's new expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtendResult {
    pub expires_at: TimestampMs,
}

/// Response to Release/Rollback: which seats actually transitioned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResult {
    pub released_seats: Vec<SeatId>,
}
