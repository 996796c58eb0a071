//! Action executors for Cadence.
//!
//! Each scheduled action type maps to an executor that drives the host's
//! automation primitives toward one goal on the target platform. Executors
//! are re-entrant: invoked off-target they only ask for a context switch.

pub mod error;
pub mod executor;
pub mod host;
pub mod locator;
pub mod steps;
pub mod template;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ActionError;
pub use executor::{ActionExecutor, ExecutorRegistry};
pub use host::{ElementHandle, Host};
pub use locator::{find_element, probe};
pub use steps::{random_delay, same_page};
pub use types::{ActionKind, ActionResult, Relationship};
