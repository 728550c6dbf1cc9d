//! HTTP surface over the Hold Coordinator and Availability Projector
//! (spec §6): `/v1/holds` mutations, `/v1/performances/{pid}/availability`
//! snapshot + SSE stream, and `/healthz`.

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
