use std::time::Duration;

/// Tuning for a reconnect delay sequence.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: f64,
    pub min_delay: f64,
    pub max_delay: f64,
    pub factor: f64,
    /// Terminate the sequence after this many delays. None means unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: 5.0,
            min_delay: 3.1,
            max_delay: 90.0,
            factor: 1.618,
            max_attempts: None,
        }
    }
}

/// A lazy sequence of reconnect delays.
///
/// The first delay is uniform random in `[0, initial_delay)` — see RFC 6455
/// §7.2.3, Recovering from Abnormal Closure. Subsequent delays grow
/// geometrically from `min_delay` and saturate at `max_delay`.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    next_delay: Option<f64>,
    yielded: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            next_delay: None,
            yielded: 0,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.yielded >= max {
                return None;
            }
        }
        self.yielded += 1;

        let delay = match self.next_delay {
            None => {
                self.next_delay = Some(self.config.min_delay);
                rand::random::<f64>() * self.config.initial_delay
            }
            Some(current) => {
                self.next_delay = Some((current * self.config.factor).min(self.config.max_delay));
                current
            }
        };
        Some(Duration::from_secs_f64(delay))
    }
}
