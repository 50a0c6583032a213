// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the download dashboard.

use crate::parse::ParsePolicy;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

const FEED_BASE: &str = "https://raw.githubusercontent.com/sgoldenlab/simba/download_stats/misc";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub feeds: FeedsConfig,
    pub refresh: RefreshConfig,
    pub parsing: ParsingConfig,
    pub display: DisplayConfig,
}

/// Locations of the three feeds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub downloads: String,
    pub github: String,
    pub gitter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Zero disables the per-attempt timeout.
    pub attempt_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub policy: ParsePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub top_countries: usize,
    pub top_versions: usize,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read config file at {}", path))?;

        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file at {}", path))
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_secs(self.retry_delay_secs),
            attempt_timeout: (self.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(self.attempt_timeout_secs)),
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            downloads: format!("{}/bigquery_download_stats.csv", FEED_BASE),
            github: format!("{}/github_stats.json", FEED_BASE),
            gitter: format!("{}/gitter_stats.json", FEED_BASE),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            max_attempts: 3,
            retry_delay_secs: 2,
            attempt_timeout_secs: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            top_countries: 15,
            top_versions: 10,
        }
    }
}
