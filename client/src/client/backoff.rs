use std::time::Duration;

/// How long the client waits before retrying after a failed or lost
/// connection
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectBackoff {
    /// The same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, capped at `max`, with up to
    /// `jitter` (a fraction of the delay) added or removed at random
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl ReconnectBackoff {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        ReconnectBackoff::Exponential {
            initial,
            max,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }

    /// Delay before retry number `attempt`, counting from 1
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            ReconnectBackoff::Fixed(delay) => *delay,
            ReconnectBackoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let exponent = attempt.saturating_sub(1).min(64) as i32;
                let base = initial.as_secs_f64() * multiplier.max(1.0).powi(exponent);
                let capped = base.min(max.as_secs_f64());
                let jitter = jitter.clamp(0.0, 1.0);
                let spread = capped * jitter * (2.0 * fastrand::f64() - 1.0);
                Duration::from_secs_f64((capped + spread).clamp(0.0, max.as_secs_f64()))
            }
        }
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        ReconnectBackoff::Fixed(Duration::from_secs(3))
    }
}
