pub mod broker;
pub mod in_process;
pub mod port;

pub use broker::BrokerEventBus;
pub use in_process::InProcessEventBus;
pub use port::{EventBus, EventSubscription};
