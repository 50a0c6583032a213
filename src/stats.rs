// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summary statistics over a set of download records.

use crate::record::DownloadRecord;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Reported as the latest version when there are no records.
pub const NO_VERSION: &str = "N/A";

/// Width of the rolling "recent downloads" window, in hours.
pub const RECENT_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedStats {
    pub total_downloads: u64,
    /// Total downloads divided by the number of distinct versions, rounded half up.
    pub average_downloads: u64,
    pub latest_version: String,
    pub downloads_by_version: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Number of days covered, counting both endpoints.
    pub days: u64,
}

/// Compute totals, the per-version average and the latest version.
pub fn calculate_stats(records: &[DownloadRecord]) -> AggregatedStats {
    let mut downloads_by_version: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_downloads: u64 = 0;

    for record in records {
        let version_total = downloads_by_version
            .entry(record.version.clone())
            .or_insert(0);
        *version_total = version_total.saturating_add(record.downloads);
        total_downloads = total_downloads.saturating_add(record.downloads);
    }

    let versions = downloads_by_version.len() as u64;
    let average_downloads = if versions > 0 {
        // Round half up without doubling the total.
        let remainder = total_downloads % versions;
        total_downloads / versions + u64::from(remainder >= versions - remainder)
    } else {
        0
    };

    let latest_version = downloads_by_version
        .keys()
        .max_by(|a, b| compare_versions(a, b).then_with(|| a.cmp(b)))
        .map(String::as_str)
        .unwrap_or(NO_VERSION)
        .to_string();

    AggregatedStats {
        total_downloads,
        average_downloads,
        latest_version,
        downloads_by_version,
    }
}

/// Compare two dot-separated version strings numerically, component by component.
///
/// Missing trailing components and non-numeric components count as zero, so
/// `1.10` sorts after `1.9` and `2` equals `2.0.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a: Vec<u64> = version_components(a);
    let b: Vec<u64> = version_components(b);

    (0..a.len().max(b.len()))
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn version_components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}

/// Compute the inclusive span of days covered by the records.
///
/// With no records the range collapses to `today` with zero days.
pub fn calculate_date_range(records: &[DownloadRecord], today: NaiveDate) -> DateRange {
    let start = records.iter().map(|r| r.date).min();
    let end = records.iter().map(|r| r.date).max();

    match (start, end) {
        (Some(start_date), Some(end_date)) => DateRange {
            start_date,
            end_date,
            days: (end_date - start_date).num_days().unsigned_abs() + 1,
        },
        _ => DateRange {
            start_date: today,
            end_date: today,
            days: 0,
        },
    }
}

/// Sum the downloads of records dated within [`RECENT_WINDOW_HOURS`] before `now`.
///
/// A record's instant is midnight UTC of its date.
pub fn recent_downloads(records: &[DownloadRecord], now: DateTime<Utc>) -> u64 {
    let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);
    records
        .iter()
        .filter(|r| r.date.and_time(NaiveTime::MIN).and_utc() >= cutoff)
        .map(|r| r.downloads)
        .fold(0, u64::saturating_add)
}
