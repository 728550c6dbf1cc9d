use serde::{Deserialize, Serialize};

use sle_core::types::{HoldId, SeatAvailability, SeatId, Version};

/// Body of `POST /v1/holds` (spec §6).
#[derive(Debug, Deserialize)]
pub struct CreateHoldBody {
    pub performance_id: String,
    pub seats: Vec<String>,
    pub ttl_seconds: u64,
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateHoldResponse {
    pub hold_id: HoldId,
    pub version: Version,
    pub expires_at: i64,
    pub seats: Vec<SeatId>,
}

/// Body of `PATCH /v1/holds` (spec §6). `hold_token` doubles as the hold id
/// and fencing token carrier — the wire shape is flat per spec, so this also
/// accepts a separate `hold_id` field issued back by `POST /v1/holds`.
#[derive(Debug, Deserialize)]
pub struct ExtendHoldBody {
    pub hold_id: HoldId,
    pub performance_id: String,
    pub seat_id: Vec<String>,
    pub additional_seconds: i64,
    pub hold_token: String,
    pub owner: String,
}

#[derive(Debug, Serialize)]
pub struct ExtendHoldResponse {
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseHoldQuery {
    pub performance_id: String,
    pub seat_id: Option<String>,
    pub owner: String,
    pub version: Version,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseHoldResponse {
    pub released_seats: Vec<SeatId>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQueryParams {
    #[allow(dead_code)]
    pub seatmap_id: Option<String>,
    /// Comma-separated seat ids to resolve. The distilled spec's Snapshot
    /// surface takes seat ids as an argument; seatmap geometry that would
    /// enumerate "every seat in this performance" is out of scope.
    pub seats: String,
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub seats: Vec<SeatAvailability>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQueryParams {
    pub seats: Option<String>,
}

pub fn parse_seat_ids(csv: &str) -> Vec<SeatId> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SeatId(s.to_string()))
        .collect()
}
