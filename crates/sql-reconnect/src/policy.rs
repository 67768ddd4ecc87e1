//! Delay applied before each reconnection attempt.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reconnection delay policy.
///
/// The delay is a blocking sleep on the calling thread, taken right before
/// the driver is asked to dial again.
#[derive(Clone, Default)]
pub enum ReconnectPolicy {
    /// Reconnect without waiting
    #[default]
    Immediate,

    /// Same delay before every attempt
    Fixed(Duration),

    /// Delay multiplied on every attempt, capped at `max`
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },

    /// Delay computed from the 1-based attempt number
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl ReconnectPolicy {
    /// Creates a policy with no delay.
    pub fn immediate() -> Self {
        ReconnectPolicy::Immediate
    }

    /// Creates a fixed delay policy.
    pub fn fixed(delay: Duration) -> Self {
        ReconnectPolicy::Fixed(delay)
    }

    /// Creates a doubling backoff policy.
    ///
    /// # Arguments
    /// * `initial` - Delay before the first attempt (e.g., 50ms)
    /// * `max` - Maximum delay cap (e.g., 2 seconds)
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        ReconnectPolicy::Exponential {
            initial,
            max,
            multiplier: 2.0,
        }
    }

    /// Creates a policy from a function of the attempt number.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        ReconnectPolicy::Custom(Arc::new(f))
    }

    /// Returns the delay before the given 1-based attempt, `None` for no wait.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            ReconnectPolicy::Immediate => None,
            ReconnectPolicy::Fixed(delay) => Some(*delay),
            ReconnectPolicy::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max.as_secs_f64() {
                    Some(*max)
                } else {
                    Some(Duration::from_secs_f64(secs))
                }
            }
            ReconnectPolicy::Custom(f) => Some(f(attempt)),
        }
    }
}

impl fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "ReconnectPolicy::Immediate"),
            Self::Fixed(d) => write!(f, "ReconnectPolicy::Fixed({d:?})"),
            Self::Exponential { initial, max, .. } => {
                write!(f, "ReconnectPolicy::Exponential({initial:?}..{max:?})")
            }
            Self::Custom(_) => write!(f, "ReconnectPolicy::Custom"),
        }
    }
}
