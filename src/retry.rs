// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retries for feed requests.

use crate::feeds::FetchError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How many times a request is attempted, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Upper bound on a single attempt. `None` lets an attempt run forever.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Every attempt failed; carries the last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gave up after {attempts} attempts: {last}")]
pub struct RetryError {
    pub attempts: u32,
    #[source]
    pub last: FetchError,
}

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `url` is only used to label timeouts and log lines.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    url: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(url, attempt, "fetching feed");

        let result = match policy.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, op())
                .await
                .unwrap_or_else(|_| {
                    Err(FetchError::Timeout {
                        url: url.to_string(),
                        after: limit,
                    })
                }),
            None => op().await,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!(url, attempt, error = %err, "feed request failed, retrying");
                sleeper.sleep(policy.delay).await;
            }
            Err(err) => {
                return Err(RetryError {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }
}
