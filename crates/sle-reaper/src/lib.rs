//! Expiry Reaper and admin block/unblock operations (spec §4.6, §9.1).
//!
//! The core hold lifecycle lives in `sle-coordinator`; this crate owns the
//! two pieces of state management that happen off the request path: lazy
//! ledger-expiry reconciliation, and operator-driven seat blocking.

pub mod admin;
pub mod reaper;

pub use admin::AdminService;
pub use reaper::{ExpiryReaper, ReaperConfig};
