//! Bounded, fixed-delay retries for broker operations
//!
//! Two shapes are built on the same attempt loop:
//! - `RetryPolicy::send` publishes a payload, pausing `wait` between failed
//!   attempts
//! - `RetryPolicy::poll` polls for a batch, where each poll is itself bounded
//!   by `wait` and an empty batch counts as a failed round
//!
//! Either way at most `max_attempts` attempts are made, so a call blocks for
//! roughly `max_attempts × wait` at worst. Pauses go through `tokio::time`, so
//! tests can run them on a paused clock.

use crate::broker::{BrokerError, BrokerMessage, Consumer, Producer};
use crate::config::BrokerConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Counts the attempts made by one logical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    max_attempts: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Records one failed attempt
    pub fn record_failure(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Why one polling round produced nothing
#[derive(Debug)]
pub enum PollFailure {
    /// The poll timed out without messages
    Idle,
    /// The broker reported an error
    Broker(BrokerError),
}

impl fmt::Display for PollFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("no messages before timeout"),
            Self::Broker(e) => write!(f, "{}", e),
        }
    }
}

/// Bounded-attempt, fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait: Duration,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least 1
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    /// Builds the policy from the broker's `comm-tries` and `wait-time`
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(config.comm_tries, config.wait())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Runs `action` until it succeeds or the attempt budget is spent
    ///
    /// `on_failure` sees every error together with the budget after it was
    /// charged. The policy sleeps `wait` between attempts, but not after the
    /// last one.
    ///
    /// # Returns
    ///
    /// * `Some(value)` - The first successful result
    /// * `None` - Every attempt failed
    pub async fn run<T, E, F, Fut>(
        &self,
        action: F,
        on_failure: impl FnMut(&E, &RetryBudget),
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.attempt_loop(action, Some(self.wait), on_failure).await
    }

    async fn attempt_loop<T, E, F, Fut>(
        &self,
        mut action: F,
        pause: Option<Duration>,
        mut on_failure: impl FnMut(&E, &RetryBudget),
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut budget = RetryBudget::new(self.max_attempts);

        loop {
            match action().await {
                Ok(value) => return Some(value),
                Err(e) => {
                    budget.record_failure();
                    on_failure(&e, &budget);

                    if budget.is_exhausted() {
                        return None;
                    }

                    if let Some(pause) = pause {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
    }

    /// Publishes `payload` to `topic`, retrying failed sends
    ///
    /// # Returns
    ///
    /// `true` once a send succeeds, `false` after `max_attempts` failures
    pub async fn send(&self, producer: &dyn Producer, topic: &str, payload: &[u8]) -> bool {
        self.run(
            move || producer.send(topic, payload),
            |e: &BrokerError, budget| {
                tracing::warn!(
                    "Could not send message. Try {}/{}: {}",
                    budget.attempts(),
                    budget.max_attempts(),
                    e
                );
            },
        )
        .await
        .is_some()
    }

    /// Polls for up to `max_n` messages, allowing `max_attempts` empty rounds
    ///
    /// Each poll waits at most `wait`. The first round that yields at least one
    /// message ends the loop; there is no extra pause between rounds.
    ///
    /// # Returns
    ///
    /// * `Some(batch)` - The messages of the first non-empty round
    /// * `None` - Every round was empty or failed
    pub async fn poll(&self, consumer: &dyn Consumer, max_n: usize) -> Option<Vec<BrokerMessage>> {
        let wait = self.wait;

        self.attempt_loop(
            move || async move {
                match consumer.poll_batch(max_n, wait).await {
                    Ok(batch) if batch.is_empty() => Err(PollFailure::Idle),
                    Ok(batch) => Ok(batch),
                    Err(e) => Err(PollFailure::Broker(e)),
                }
            },
            None,
            |failure, budget| match failure {
                PollFailure::Idle => tracing::warn!(
                    "Timeout ({} seconds) while trying to get {} requests ({}/{} tries)",
                    wait.as_secs_f64(),
                    max_n,
                    budget.attempts(),
                    budget.max_attempts()
                ),
                PollFailure::Broker(e) => tracing::warn!(
                    "Poll failed while trying to get {} requests ({}/{} tries): {}",
                    max_n,
                    budget.attempts(),
                    budget.max_attempts(),
                    e
                ),
            },
        )
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&BrokerConfig::default())
    }
}
