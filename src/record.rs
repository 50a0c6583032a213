// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record types shared by the parser, the aggregators and the feeds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of download activity from the downloads feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub date: NaiveDate,
    pub downloads: u64,
    pub version: String,
    /// Two-letter country code, as found in the feed.
    pub country: Option<String>,
}

impl DownloadRecord {
    pub fn new(date: NaiveDate, version: &str, country: Option<&str>, downloads: u64) -> Self {
        Self {
            date,
            downloads,
            version: version.to_string(),
            country: country.map(str::to_string),
        }
    }
}

/// Forum activity snapshot for the GitHub discussions board.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GithubStats {
    pub post_cnt: u64,
    pub comment_cnt: u64,
    pub post_authors: u64,
    pub date: String,
}

/// Chat activity snapshot for the Gitter room.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GitterStats {
    pub post_cnt: u64,
    pub unique_users_with_posts: u64,
    pub avg_posts_per_user: f64,
    pub date: String,
}
