pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod types;

pub use config::Config;
pub use constants::*;
pub use error::SleError;
pub use types::*;
