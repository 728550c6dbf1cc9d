pub mod memory;
pub mod port;
pub mod redis_ledger;

pub use memory::MemoryLockLedger;
pub use port::{AcquireOutcome, LockLedger, MutateOutcome};
pub use redis_ledger::RedisLockLedger;
