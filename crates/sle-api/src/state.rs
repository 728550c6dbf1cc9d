use std::sync::Arc;

use sle_bus::EventBus;
use sle_coordinator::HoldCoordinator;
use sle_ledger::LockLedger;
use sle_projector::AvailabilityQuery;
use sle_reaper::AdminService;
use sle_shadow::ShadowStore;

/// Shared application state wired once in `sle-node` and cloned per request
/// (everything inside is already an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<HoldCoordinator>,
    pub query: Arc<AvailabilityQuery>,
    pub admin: Arc<AdminService>,
    pub bus: Arc<dyn EventBus>,
    pub ledger: Arc<dyn LockLedger>,
    pub shadow: Arc<dyn ShadowStore>,
}
