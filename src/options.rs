use std::time::Duration;

/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    ///
    /// Zero means every transport failure is returned to the caller as-is.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 0,
            retry_backoff_ms: 250,
        }
    }
}

/// Configures how a submitted statement is polled until it reaches a
/// terminal status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollOptions {
    /// Delay before the second status request.
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay between status requests.
    pub max_delay_ms: u64,
    /// Factor applied to the delay after every pending status.
    pub multiplier: u32,
    /// Total time budget; `None` polls until the warehouse decides.
    pub max_wait_ms: Option<u64>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            multiplier: 2,
            max_wait_ms: None,
        }
    }
}

impl PollOptions {
    /// Delay to wait after the `attempt`-th pending status (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt.min(32));
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    pub(crate) fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}
