//! Shared adaptive request throttle
//!
//! A single delay is applied before every fetch attempt of the whole crawl.
//! Rate-limit responses double it (up to the ceiling), successful and
//! not-modified responses shrink it by a quarter (down to the floor).

use crate::config::ThrottleConfig;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Below this the delay snaps to the floor instead of decaying forever
const NEGLIGIBLE_DELAY: Duration = Duration::from_millis(1);

/// Process-wide delay shared by all workers of a crawl
#[derive(Debug)]
pub struct Throttle {
    delay: Mutex<Duration>,
    min: Duration,
    max: Duration,
    step: Duration,
}

impl Throttle {
    /// Creates a throttle starting at its floor
    ///
    /// # Arguments
    ///
    /// * `min` - Lowest delay, also the initial one
    /// * `max` - Highest delay
    /// * `step` - Delay reached by slowing down from below it
    pub fn new(min: Duration, max: Duration, step: Duration) -> Self {
        let max = max.max(min);
        Self {
            delay: Mutex::new(min),
            min,
            max,
            step: step.clamp(min, max),
        }
    }

    /// Creates a throttle from configuration
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.step_ms),
        )
    }

    /// Returns the current delay
    pub fn current(&self) -> Duration {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the current delay
    pub async fn sleep(&self) {
        let delay = self.current();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Shrinks the delay after a successful response
    pub fn speed_up(&self) {
        let mut delay = self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        let next = *delay * 3 / 4;
        *delay = if next < self.min || next < NEGLIGIBLE_DELAY {
            self.min
        } else {
            next
        };
    }

    /// Grows the delay after a rate-limit response
    pub fn slow_down(&self) {
        let mut delay = self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        let next = (*delay * 2).max(self.step).min(self.max);
        if next != *delay {
            tracing::info!("Throttling requests: delay {:?} -> {:?}", *delay, next);
        }
        *delay = next;
    }
}
