//! Deadline-bounded polling for cluster state.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::HarnessError;

/// Default spacing between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Polls `probe` until it yields a value or `budget` elapses.
///
/// The probe is called immediately, then every `interval`. Returning
/// `Ok(None)` means "not yet"; `Ok(Some(v))` resolves the wait with `v`.
/// Errors from the probe abort the wait at once, so API failures surface
/// instead of burning the remaining budget.
///
/// `condition` names what is being waited on and is carried into the
/// timeout error.
///
/// # Errors
///
/// Returns [`HarnessError::WaitTimeout`] when the budget elapses, or the
/// probe's own error if one occurs first.
pub async fn wait_until<T, F, Fut>(
    condition: &str,
    budget: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<T, HarnessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, HarnessError>>,
{
    debug!(condition, budget_secs = budget.as_secs(), "waiting");

    let poll_loop = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(value) = probe().await? {
                debug!(condition, attempt, "condition met");
                return Ok(value);
            }
            trace!(condition, attempt, "not yet");
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(budget, poll_loop).await {
        Ok(result) => result,
        Err(_) => Err(HarnessError::WaitTimeout {
            condition: condition.to_string(),
            waited: budget,
        }),
    }
}
