//! # Reconnect policy for the inbound event stream.
//!
//! [`ReconnectPolicy`] controls the delay between attempts to reach the event
//! source. The delay for attempt `n` (0-indexed) is `first × factor^n`, clamped
//! to `max`. With `jitter` enabled the clamped value `d` becomes
//! `d/2 + random[0, d/2]` (equal jitter), so processes restarted together do not
//! hammer the simulation server in lockstep.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use simstub::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: false,
//! };
//!
//! assert_eq!(policy.next(0), Duration::from_millis(100));
//! assert_eq!(policy.next(1), Duration::from_millis(200));
//! assert_eq!(policy.next(10), Duration::from_secs(2));
//! ```

use std::time::Duration;

use rand::Rng;

/// Reconnect delay policy.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = constant delay).
    pub factor: f64,
    /// Apply equal jitter to the computed delay.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    /// Constant 100ms polling, capped at 5s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 1.0,
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to [`ReconnectPolicy::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        if self.jitter {
            equal_jitter(base)
        } else {
            base
        }
    }
}

/// `delay/2 + random[0, delay/2]`
fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    let half = ms / 2;
    if half == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=half);
    Duration::from_millis(ms - half + extra)
}
