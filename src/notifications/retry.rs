//! Bounded retry with exponential backoff.
//!
//! The loop knows nothing about push semantics: each attempt reports whether
//! it is done, should be retried (optionally after a server-provided delay),
//! or failed for good.

use rand::Rng;
use shared::config::NotificationConfig;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Fraction of the interval used as the jitter window, 0.5 means ±50%
    pub randomization_factor: f64,
    /// Upper bound of any single wait, including server-provided hints
    pub max_interval: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
        }
    }
}

/// Jittered, growing wait intervals
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.initial_interval;
        Self { config, current }
    }

    pub fn next_backoff(&mut self) -> Duration {
        let base = self.current;
        let grown = base.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(grown).min(self.config.max_interval);

        let delta = base.as_secs_f64() * self.config.randomization_factor;
        let jittered = if delta > 0.0 {
            rand::thread_rng().gen_range(base.as_secs_f64() - delta..=base.as_secs_f64() + delta)
        } else {
            base.as_secs_f64()
        };

        Duration::from_secs_f64(jittered.max(0.0)).min(self.config.max_interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

impl From<&NotificationConfig> for RetryPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            max_tries: config.max_send_tries.max(1),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Result of one attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Try again. `after` overrides the backoff curve for this wait.
    Retry { error: E, after: Option<Duration> },
    Fail(E),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E> {
    #[error("{0}")]
    Permanent(E),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// The underlying error, without the retry bookkeeping
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Runs `op` until it is done, fails permanently, or `max_tries` attempts have
/// been made. `notify` is called with the error and the wait before every
/// retry.
pub async fn retry<T, E, Op, Fut, N>(
    policy: &RetryPolicy,
    mut op: Op,
    mut notify: N,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    N: FnMut(&E, Duration),
{
    let mut backoff = ExponentialBackoff::new(policy.backoff.clone());
    let mut attempt = 1;

    loop {
        let (error, after) = match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(error) => return Err(RetryError::Permanent(error)),
            Attempt::Retry { error, after } => (error, after),
        };

        if attempt >= policy.max_tries {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let wait = match after {
            Some(hint) => hint.min(policy.backoff.max_interval),
            None => backoff.next_backoff(),
        };
        notify(&error, wait);
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy {
            max_tries,
            backoff: BackoffConfig {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(50),
                ..Default::default()
            },
        }
    }

    #[test]
    fn backoff_stays_within_jitter_window_and_cap() {
        let mut backoff = ExponentialBackoff::new(BackoffConfig::default());

        let first = backoff.next_backoff();
        assert!(first >= Duration::from_millis(250) && first <= Duration::from_millis(750));

        let second = backoff.next_backoff();
        assert!(second >= Duration::from_millis(375) && second <= Duration::from_millis(1125));

        for _ in 0..50 {
            assert!(backoff.next_backoff() <= Duration::from_secs(60));
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let notified = Cell::new(0);
        let result: Result<u32, RetryError<&str>> = retry(
            &fast_policy(3),
            |attempt| async move {
                if attempt < 3 {
                    Attempt::Retry {
                        error: "busy",
                        after: None,
                    }
                } else {
                    Attempt::Done(attempt)
                }
            },
            |_, _| notified.set(notified.get() + 1),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(notified.get(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_tries() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<&str>> = retry(
            &fast_policy(3),
            |_| {
                calls.set(calls.get() + 1);
                async {
                    Attempt::Retry {
                        error: "busy",
                        after: Some(Duration::from_millis(1)),
                    }
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(calls.get(), 3);
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "busy"
            })
        );
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<&str>> = retry(
            &fast_policy(5),
            |_| {
                calls.set(calls.get() + 1);
                async { Attempt::Fail("gone") }
            },
            |_, _| panic!("must not retry"),
        )
        .await;

        assert_eq!(calls.get(), 1);
        assert_eq!(result.unwrap_err().into_inner(), "gone");
    }

    #[tokio::test]
    async fn server_hint_is_capped() {
        let waits = std::cell::RefCell::new(Vec::new());
        let _: Result<(), RetryError<&str>> = retry(
            &fast_policy(2),
            |_| async {
                Attempt::Retry {
                    error: "slow down",
                    after: Some(Duration::from_secs(3600)),
                }
            },
            |_, wait| waits.borrow_mut().push(wait),
        )
        .await;

        assert_eq!(*waits.borrow(), vec![Duration::from_millis(50)]);
    }
}
