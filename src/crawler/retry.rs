//! Retry state machine for server errors
//!
//! A fetch moves `Attempting -> Backoff(delay) -> Attempting -> ... -> Terminal`.
//! Only 5xx responses drive the machine; every other outcome ends the loop in
//! the fetcher directly.

use std::time::Duration;

/// Attempt budget and initial retry delay for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub tries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(tries: u32, initial_delay: Duration) -> Self {
        Self {
            tries: tries.max(1),
            initial_delay,
        }
    }

    /// The state before the first request
    pub fn start(&self) -> RetryState {
        RetryState::Attempting {
            attempt: 1,
            delay: self.initial_delay,
        }
    }

    /// Backoff growth: `delay * 7/4`, never below the initial delay
    pub fn next_delay(&self, delay: Duration) -> Duration {
        (delay * 7 / 4).max(self.initial_delay)
    }

    /// Transition taken after a server error; the delay grows before the sleep
    pub fn on_server_error(&self, state: RetryState) -> RetryState {
        match state {
            RetryState::Attempting { attempt, .. } if attempt >= self.tries => RetryState::Terminal,
            RetryState::Attempting { attempt, delay } => RetryState::Backoff {
                attempt,
                delay: self.next_delay(delay),
            },
            other => other,
        }
    }

    /// Transition taken once the backoff sleep is over
    pub fn after_backoff(&self, state: RetryState) -> RetryState {
        match state {
            RetryState::Backoff { attempt, delay } => RetryState::Attempting {
                attempt: attempt + 1,
                delay,
            },
            other => other,
        }
    }
}

/// Position of a fetch in its retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Request number `attempt` is about to be sent
    Attempting { attempt: u32, delay: Duration },
    /// Waiting `delay` after failed attempt `attempt`
    Backoff { attempt: u32, delay: Duration },
    /// Attempt budget used up
    Terminal,
}
