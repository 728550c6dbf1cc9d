pub mod query;
pub mod stream;

pub use query::AvailabilityQuery;
pub use stream::{GapOutcome, SequenceTracker};
