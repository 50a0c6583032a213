// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The complete derived state of one successful refresh cycle.

use crate::aggregate::{self, CountryAggregate, WeeklyBucket};
use crate::parse::ParseOutcome;
use crate::record::{DownloadRecord, GithubStats, GitterStats};
use crate::stats::{self, AggregatedStats, DateRange};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the dashboard shows, computed from a single set of feeds.
///
/// A snapshot is never modified after it is built; a refresh publishes a new
/// one in its place.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Increases by one with every published snapshot.
    pub generation: u64,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<DownloadRecord>,
    pub rejected_rows: usize,
    /// Why the downloads feed could not be read at all, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_error: Option<String>,
    pub stats: AggregatedStats,
    pub date_range: DateRange,
    pub recent_downloads: u64,
    pub unique_countries: usize,
    pub weekly: Vec<WeeklyBucket>,
    pub countries: Vec<CountryAggregate>,
    pub github: GithubStats,
    pub gitter: GitterStats,
}

impl Snapshot {
    pub fn build(
        generation: u64,
        outcome: ParseOutcome,
        github: GithubStats,
        gitter: GitterStats,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let records = outcome.records;

        Self {
            generation,
            fetched_at,
            rejected_rows: outcome.rejected_rows,
            feed_error: outcome.failure.map(|failure| failure.to_string()),
            stats: stats::calculate_stats(&records),
            date_range: stats::calculate_date_range(&records, fetched_at.date_naive()),
            recent_downloads: stats::recent_downloads(&records, fetched_at),
            unique_countries: aggregate::unique_countries(&records),
            weekly: aggregate::weekly_buckets(&records),
            countries: aggregate::country_aggregates(&records),
            github,
            gitter,
            records,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parse::parse_csv;
    use chrono::TimeZone;

    pub(crate) fn github_stats() -> GithubStats {
        GithubStats {
            post_cnt: 10,
            comment_cnt: 25,
            post_authors: 6,
            date: "2024-01-05".to_string(),
        }
    }

    pub(crate) fn gitter_stats() -> GitterStats {
        GitterStats {
            post_cnt: 40,
            unique_users_with_posts: 8,
            avg_posts_per_user: 5.0,
            date: "2024-01-05".to_string(),
        }
    }

    #[test]
    fn test_build_snapshot() {
        let csv = "download_date,country,package_version,download_count\n\
                   2024-01-01,US,1.0.0,10\n\
                   2024-01-04,DE,1.1.0,5\n\
                   2024-01-05,US,1.1.0,20\n\
                   2024-01-05,US,1.1.0,nope\n";
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let snapshot = Snapshot::build(3, parse_csv(csv), github_stats(), gitter_stats(), now);

        assert_eq!(snapshot.generation, 3);
        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(snapshot.rejected_rows, 1);
        assert_eq!(snapshot.feed_error, None);
        assert_eq!(snapshot.stats.total_downloads, 35);
        assert_eq!(snapshot.stats.latest_version, "1.1.0");
        assert_eq!(snapshot.date_range.days, 5);
        assert_eq!(snapshot.recent_downloads, 25);
        assert_eq!(snapshot.unique_countries, 2);
        // 2023-12-31 and 2024-01-01..06 share one Sunday-aligned week.
        assert_eq!(snapshot.weekly.len(), 1);
        assert_eq!(snapshot.weekly[0].downloads, 35);
        assert_eq!(snapshot.countries[0].country, "US");
        assert_eq!(snapshot.countries[0].downloads, 30);
    }

    #[test]
    fn test_build_empty_snapshot() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let snapshot = Snapshot::build(1, parse_csv(""), github_stats(), gitter_stats(), now);

        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.stats.latest_version, "N/A");
        assert_eq!(snapshot.date_range.days, 0);
        assert_eq!(snapshot.date_range.start_date, now.date_naive());
        assert!(snapshot.weekly.is_empty());
        assert!(snapshot.countries.is_empty());
        assert_eq!(
            snapshot.feed_error.as_deref(),
            Some("no data lines found in CSV")
        );
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let csv = "download_date,country,download_count\n2024-01-01,US,10\n";
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let snapshot = Snapshot::build(1, parse_csv(csv), github_stats(), gitter_stats(), now);

        assert!(snapshot.records.is_empty());
        assert_eq!(
            snapshot.feed_error.as_deref(),
            Some("required columns not found: package_version")
        );
    }
}
