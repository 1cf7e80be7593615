//! Bounded polling primitive.
//!
//! Every wait in the harvester, injector and receiver goes through
//! [`await_condition`]: probe, and if unsatisfied sleep for `interval`
//! and probe again, at most `max_attempts` times. Nothing polls forever.

use std::future::Future;
use std::time::Duration;

/// Result of a bounded poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value on the given attempt (1-based).
    Satisfied { value: T, attempt: u32 },
    /// All attempts were used without the probe producing a value.
    TimedOut,
}

impl<T> PollOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            PollOutcome::Satisfied { value, .. } => Some(value),
            PollOutcome::TimedOut => None,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// Probe up to `max_attempts` times, `interval` apart.
///
/// The first probe runs immediately; there is no sleep after the last one.
pub async fn await_condition<T, F, Fut>(
    mut probe: F,
    interval: Duration,
    max_attempts: u32,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_attempts {
        if let Some(value) = probe().await {
            return PollOutcome::Satisfied { value, attempt };
        }
        if attempt < max_attempts {
            settle(interval).await;
        }
    }
    PollOutcome::TimedOut
}

/// Suspend the current step without blocking other tasks.
pub async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
