//! Evaluation of ordered locator chains.

use std::time::Duration;

use tracing::debug;

use cadence_core::types::Locator;

use crate::error::ActionError;
use crate::host::{ElementHandle, Host};

/// One pass over the chain, first match wins. An empty chain never matches.
pub async fn probe(
    host: &dyn Host,
    chain: &[Locator],
) -> Result<Option<ElementHandle>, ActionError> {
    for locator in chain {
        if let Some(handle) = host.locate(locator).await? {
            debug!(locator = %locator, "Element located");
            return Ok(Some(handle));
        }
    }
    Ok(None)
}

/// Probe the chain up to `attempts` times with a fixed `delay` between
/// passes, then give up with a descriptive error.
pub async fn find_element(
    host: &dyn Host,
    chain: &[Locator],
    what: &str,
    attempts: u32,
    delay: Duration,
) -> Result<ElementHandle, ActionError> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(handle) = probe(host, chain).await? {
            return Ok(handle);
        }
        if attempt < attempts {
            debug!(what, attempt, "Element not found yet, retrying");
            host.sleep(delay).await;
        }
    }
    Err(ActionError::ElementNotFound {
        what: what.to_string(),
        attempts,
    })
}
