//! ─── Seat Lock Engine defaults ──────────────────────────────────────────────
//!
//! Environment-overridable knobs (spec §6). Each constant here is the
//! hard-coded default used when the corresponding env var is unset; see
//! [`crate::config::Config::from_env`].

/// Default hold TTL when the caller omits `ttl_seconds` (milliseconds).
pub const HOLD_TTL_MS_DEFAULT: u64 = 120_000;

/// Maximum total hold life across all Extend calls (milliseconds).
pub const HOLD_TTL_MS_MAX: u64 = 300_000;

/// Maximum number of seats a single Acquire request may target.
pub const HOLD_MAX_SEATS_PER_REQUEST: usize = 25;

/// Maximum byte length of an owner identity string.
pub const HOLD_OWNER_ID_MAX_LENGTH: usize = 128;

/// How long a successful Acquire's idempotency record is honored, in hours.
pub const IDEMPOTENCY_TTL_HOURS: u64 = 24;

/// Per-script wall-clock budget for one Lock Ledger invocation (milliseconds).
pub const LEDGER_COMMAND_TIMEOUT_MS: u64 = 50;

/// Overall operation budget for Acquire/Extend/Release/Rollback, including
/// retries (milliseconds).
pub const OPERATION_TIMEOUT_MS: u64 = 150;

/// Overall operation budget for Convert, including retries (milliseconds).
pub const CONVERT_TIMEOUT_MS: u64 = 500;

/// Maximum retries on transient Lock Ledger substrate errors.
pub const LEDGER_MAX_RETRIES: u32 = 3;

/// Default per-owner rate-limit burst size.
pub const RATE_LIMIT_BURST: u32 = 10;

/// Rate-limit window, in seconds, over which `RATE_LIMIT_BURST` applies.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Reaper sweep cadence (milliseconds).
pub const REAPER_INTERVAL_MS: u64 = 1_000;

/// Grace period added to `expires_at` before the Reaper will sweep a hold
/// (milliseconds). Absorbs clock skew between the Coordinator and ledger.
pub const REAPER_GRACE_MS: u64 = 5_000;

/// Ledger key grammar prefix (spec §3): `hold:v1:{tenant:performance}:seat`.
pub const LEDGER_KEY_PREFIX: &str = "hold:v1";
