use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Monotonic per-(tenant,performance) version counter. Doubles as the
/// numeric half of a fencing token.
pub type Version = u64;

// ── TenantId ─────────────────────────────────────────────────────────────────

/// Opaque tenant identifier, taken from the already-validated `X-Tenant-Id`
/// header. The engine never interprets its contents.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

// ── PerformanceId ────────────────────────────────────────────────────────────

/// Identifies one performance (a single showing) within a tenant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PerformanceId(pub String);

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PerformanceId({})", self.0)
    }
}

// ── SeatId ───────────────────────────────────────────────────────────────────

/// A single seat within a performance's seatmap. The engine treats this as
/// an opaque label; seatmap geometry is out of scope.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeatId(pub String);

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeatId({})", self.0)
    }
}

// ── Owner ────────────────────────────────────────────────────────────────────

/// Opaque caller identity (user or session), supplied by the authenticated
/// principal one layer up. Length-validated against `HOLD_OWNER_ID_MAX_LENGTH`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub String);

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Owner({})", &self.0)
    }
}

impl Owner {
    /// Short, stable hash used in the fencing token's textual form so the
    /// token does not leak the raw owner identity verbatim.
    pub fn hash_hex(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

// ── HoldId ───────────────────────────────────────────────────────────────────

/// A hold's primary key. Randomly generated (UUID v4) at Acquire time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldId(pub uuid::Uuid);

impl HoldId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for HoldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HoldId({})", self.0)
    }
}

// ── FencingToken ─────────────────────────────────────────────────────────────

/// The `(version, owner)` pair required to mutate a hold, in its opaque
/// wire encoding `"<version>:<owner_hash>"`. Tokens are single-performance
/// and worthless once any releasing/converting mutation occurs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FencingToken(pub String);

impl FencingToken {
    pub fn encode(version: Version, owner: &Owner) -> Self {
        Self(format!("{version}:{}", owner.hash_hex()))
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FencingToken({})", self.0)
    }
}

// ── Hold ─────────────────────────────────────────────────────────────────────

/// A hold's lifecycle state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HoldState {
    Active,
    Extended,
    Released,
    Expired,
    Converted,
}

/// One append-only audit entry on a hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldEvent {
    pub event_type: HoldEventType,
    pub at: TimestampMs,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldEventType {
    Created,
    Extended,
    Released,
    RolledBack,
    Expired,
    Converted,
}

/// Durable record of a multi-seat hold (spec §3, Shadow Store row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub hold_id: HoldId,
    pub tenant_id: TenantId,
    pub performance_id: PerformanceId,
    pub seats: Vec<SeatId>,
    pub owner: Owner,
    pub version: Version,
    pub expires_at: TimestampMs,
    /// Sum of every `additional_ms` granted so far, including the initial
    /// TTL. Used to enforce `HOLD_MAX_TTL_MS` across repeated Extend calls.
    pub total_life_ms: i64,
    pub state: HoldState,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
    pub events: Vec<HoldEvent>,
}

impl Hold {
    pub fn fencing_token(&self) -> FencingToken {
        FencingToken::encode(self.version, &self.owner)
    }
}

// ── Block / Sold ─────────────────────────────────────────────────────────────

/// Admin-forced unavailability, orthogonal to holding and selling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub tenant_id: TenantId,
    pub performance_id: PerformanceId,
    pub seat_id: SeatId,
    pub reason: String,
    pub created_at: TimestampMs,
}

/// Terminal record left behind once a hold converts to a paid order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldRecord {
    pub tenant_id: TenantId,
    pub performance_id: PerformanceId,
    pub seat_id: SeatId,
    pub order_id: String,
}

// ── Availability ─────────────────────────────────────────────────────────────

/// Per-seat availability, as returned by the Projector's Snapshot surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Held,
    Sold,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub seat_id: SeatId,
    pub status: SeatStatus,
    /// Set when the ledger owner of a `Held` seat matches the requesting
    /// principal, so UIs can distinguish the caller's own holds.
    pub owner_self: Option<bool>,
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Change-stream event kinds (spec §4.4/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatEventKind {
    Locked,
    Released,
    Sold,
    Expired,
    Blocked,
    Unblocked,
}

/// One ordered event on a (tenant, performance) partition's availability
/// stream. Carries a monotonic `sequence` so subscribers can detect gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatEvent {
    pub tenant_id: TenantId,
    pub performance_id: PerformanceId,
    pub seat_id: SeatId,
    pub kind: SeatEventKind,
    pub at: TimestampMs,
    pub sequence: u64,
}
