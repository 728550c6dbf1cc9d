pub mod coordinator;
pub mod rate_limit;
pub mod requests;

pub use coordinator::HoldCoordinator;
pub use rate_limit::{FixedWindowRateLimiter, RateLimiter};
pub use requests::{
    AcquireRequest, ConvertRequest, ExtendRequest, ExtendResult, ReleaseRequest, ReleaseResult,
    RollbackRequest,
};
