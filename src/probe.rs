//! Bounded polling of a single resource until its status satisfies a predicate.
//!
//! The cluster converges asynchronously: clearing a volume's claim reference does not make the
//! volume `Available` in the same request, and a new claim is bound by the controller some time
//! after it is applied. Every such wait goes through [`wait_for`] so the budget is explicit and
//! configurable.

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::{config::PollPolicy, Result};

/// Final observation of a wait.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<K> {
    /// The predicate held on this observation.
    Satisfied(K),
    /// Attempts ran out. Holds the last observation, `None` if the resource was absent.
    TimedOut { last: Option<K>, attempts: u32 },
}

impl<K> Probe<K> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Probe::Satisfied(_))
    }

    /// Last observed state, whichever way the wait ended.
    pub fn into_last(self) -> Option<K> {
        match self {
            Probe::Satisfied(k) => Some(k),
            Probe::TimedOut { last, .. } => last,
        }
    }
}

/// Observe with `fetch` up to `policy.attempts` times, sleeping `policy.interval` after each
/// observation that does not satisfy `predicate`.
///
/// Running out of attempts is not an error: the caller decides whether a [`Probe::TimedOut`] is
/// fatal. Errors from `fetch` are returned immediately.
pub async fn wait_for<K, F, Fut, P>(
    what: &str, policy: &PollPolicy, mut fetch: F, mut predicate: P,
) -> Result<Probe<K>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<K>>>,
    P: FnMut(&K) -> bool,
{
    let interval = policy.interval()?;
    poll(what, policy.attempts, interval, &mut fetch, &mut predicate).await
}

async fn poll<K, F, Fut, P>(
    what: &str, attempts: u32, interval: Duration, fetch: &mut F, predicate: &mut P,
) -> Result<Probe<K>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<K>>>,
    P: FnMut(&K) -> bool,
{
    let mut last = None;
    for attempt in 1..=attempts {
        match fetch().await? {
            Some(current) if predicate(&current) => {
                debug!(what, attempt, "Condition met");
                return Ok(Probe::Satisfied(current));
            }
            observed => last = observed,
        }

        debug!(what, attempt, attempts, ?interval, "Condition not met yet, waiting");
        tokio::time::sleep(interval).await;
    }

    warn!(what, attempts, "Gave up waiting");
    Ok(Probe::TimedOut { last, attempts })
}
