// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for fetching the dashboard feeds.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "download-dashboard (https://github.com/sgoldenlab/simba)";

/// The three feeds fetched every refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Downloads,
    Github,
    Gitter,
}

impl Feed {
    pub fn as_str(self) -> &'static str {
        match self {
            Feed::Downloads => "downloads",
            Feed::Github => "github",
            Feed::Gitter => "gitter",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed attempt to fetch a feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
}

/// Source of raw feed bodies.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch the body of `url` as text.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// [`FeedClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let transport = |err: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        };

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.text().await.map_err(transport)
    }
}
