// Bounded retry with linear backoff
//
// Used for lazy capability initialization (transient network errors only,
// 2s/4s between attempts) and for translation provider calls (any error,
// 0.5s/1.0s between attempts).

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// How many times to try an operation and how long to wait in between.
///
/// The delay after the n-th failed attempt (1-based) is `n * backoff_step`.
/// No delay follows the final attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_step: Duration,
    retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_step", &self.backoff_step)
            .finish_non_exhaustive()
    }
}

/// Every attempt failed, or the error was not retryable
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: usize,
    pub last_error: anyhow::Error,
}

impl fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {:#}", self.attempts, self.last_error)
    }
}

impl std::error::Error for RetryExhausted {}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
            retryable: Arc::new(|_| true),
        }
    }

    /// Only retry errors for which `predicate` returns true
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Capability initialization: 3 attempts, 2s then 4s, network errors only
    pub fn initialization(max_attempts: usize, backoff_step: Duration) -> Self {
        Self::new(max_attempts, backoff_step).retry_if(is_transient_network_error)
    }

    /// Provider calls: 3 attempts, 0.5s then 1.0s, any error
    pub fn provider_call(max_attempts: usize, backoff_step: Duration) -> Self {
        Self::new(max_attempts, backoff_step)
    }

    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff_step * attempt as u32
    }

    pub fn is_retryable(&self, err: &anyhow::Error) -> bool {
        (self.retryable)(err)
    }

    /// Run `op` until it succeeds, a non-retryable error occurs, or attempts run out
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err: anyhow::Error = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e.into(),
            };

            if attempt >= self.max_attempts || !self.is_retryable(&err) {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }

            let delay = self.delay_after(attempt);
            warn!(
                "{}: attempt {}/{} failed: {:#} (retrying in {:.1}s)",
                label,
                attempt,
                self.max_attempts,
                err,
                delay.as_secs_f32()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// True for connectivity symptoms worth waiting out
///
/// Walks the whole error chain: reqwest connect/timeout errors, connection
/// level io errors, and messages that look like DNS or socket failures.
pub fn is_transient_network_error(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_connect() || e.is_timeout() {
                return true;
            }
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::TimedOut
            ) {
                return true;
            }
        }
    }

    let message = format!("{:#}", err).to_lowercase();
    ["urlopen error", "name resolution", "connection", "dns error"]
        .iter()
        .any(|needle| message.contains(needle))
}
