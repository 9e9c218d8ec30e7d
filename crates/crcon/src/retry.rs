use std::time::Duration;

const MIN_SERVER_ERROR_STATUS: u16 = 500;

/// Jittered exponential retry schedule for API requests.
///
/// Retries any 5xx response by default. Transport errors are only retried
/// when `retry_transport_errors` is opted in, since the request may already
/// have reached the server.
#[derive(Debug, Clone)]
pub struct JitterRetry {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub start_timeout: f64,
    pub max_timeout: f64,
    pub factor: f64,
    pub random_interval_size: f64,
    /// Extra statuses to retry beyond the 5xx range.
    pub statuses: Vec<u16>,
    pub retry_all_server_errors: bool,
    pub retry_transport_errors: bool,
}

impl Default for JitterRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            start_timeout: 0.1,
            max_timeout: 30.0,
            factor: 2.0,
            random_interval_size: 2.0,
            statuses: Vec::new(),
            retry_all_server_errors: true,
            retry_transport_errors: false,
        }
    }
}

impl JitterRetry {
    /// A schedule that never retries, for non-idempotent operations.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Default::default()
        }
    }

    pub fn should_retry_status(&self, attempt: u32, status: u16) -> bool {
        if attempt >= self.attempts {
            return false;
        }
        if status >= MIN_SERVER_ERROR_STATUS && self.retry_all_server_errors {
            return true;
        }
        self.statuses.contains(&status)
    }

    pub fn should_retry_transport(&self, attempt: u32) -> bool {
        attempt < self.attempts && self.retry_transport_errors
    }

    /// The delay before the given (1-based) attempt's retry.
    pub fn timeout(&self, attempt: u32) -> Duration {
        let exponential = self.start_timeout * self.factor.powi(attempt as i32);
        let base = exponential.min(self.max_timeout);
        let jitter = (rand::random::<f64>() * self.random_interval_size).powf(self.factor);
        Duration::from_secs_f64(base + jitter)
    }
}
