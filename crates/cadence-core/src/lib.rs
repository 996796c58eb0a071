pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use events::{Notifier, RunnerEvent};
pub use types::*;
