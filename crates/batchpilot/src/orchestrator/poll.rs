use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::common::error::BatchError;
use crate::common::utils::time::whole_minutes;
use crate::orchestrator::config::get_poll_interval;

/// Bounded waiting on a remote condition with a fixed tick.
///
/// The caller evaluates its condition and calls [`PollLoop::next_tick`] when it is not
/// satisfied yet:
///
/// ```ignore
/// let mut poll = PollLoop::new("steady state", format!("pool {pool_id}"), timeout);
/// loop {
///     if condition().await? {
///         break;
///     }
///     poll.next_tick().await?;
/// }
/// ```
pub struct PollLoop {
    what: String,
    resource: String,
    interval: Duration,
    timeout: Duration,
    start: Instant,
}

impl PollLoop {
    pub fn new(what: impl Into<String>, resource: impl Into<String>, timeout: Duration) -> Self {
        Self::with_interval(what, resource, timeout, get_poll_interval())
    }

    pub fn with_interval(
        what: impl Into<String>,
        resource: impl Into<String>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        assert!(!interval.is_zero());
        Self {
            what: what.into(),
            resource: resource.into(),
            interval,
            timeout,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Fails with [`BatchError::Timeout`] if the deadline has passed, otherwise sleeps until
    /// the next tick boundary.
    pub async fn next_tick(&mut self) -> crate::Result<()> {
        let elapsed = self.elapsed();
        if elapsed >= self.timeout {
            return Err(self.timeout_error(elapsed));
        }
        sleep(time_to_next_tick(elapsed, self.interval)).await;
        Ok(())
    }

    fn timeout_error(&self, elapsed: Duration) -> BatchError {
        BatchError::Timeout {
            what: self.what.clone(),
            resource: self.resource.clone(),
            elapsed_minutes: whole_minutes(elapsed),
        }
    }
}

/// Keeps the ticks aligned to multiples of `interval` since the start, regardless of how
/// long the evaluation of the condition took.
fn time_to_next_tick(elapsed: Duration, interval: Duration) -> Duration {
    let remainder = (elapsed.as_nanos() % interval.as_nanos()) as u64;
    interval - Duration::from_nanos(remainder)
}
