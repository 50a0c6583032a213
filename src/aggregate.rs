// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weekly and per-country aggregation of download records.

use crate::record::DownloadRecord;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Downloads for one Sunday-aligned week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklyBucket {
    pub week_start: NaiveDate,
    pub downloads: u64,
    /// Largest single record seen in the week, used to scale chart intensity.
    pub max_downloads: u64,
}

/// Downloads for one country, with a per-version breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryAggregate {
    pub country: String,
    pub downloads: u64,
    pub versions: BTreeMap<String, u64>,
}

impl CountryAggregate {
    /// Display name of the country, falling back to its code.
    pub fn name(&self) -> &str {
        country_name(&self.country)
    }

    /// The `limit` versions with the most downloads, largest first.
    pub fn top_versions(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut versions: Vec<(&str, u64)> = self
            .versions
            .iter()
            .map(|(version, downloads)| (version.as_str(), *downloads))
            .collect();
        versions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        versions.truncate(limit);
        versions
    }
}

/// Get the Sunday of the week containing the given date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_sunday = date.weekday().num_days_from_sunday();
    date - chrono::Duration::days(days_from_sunday as i64)
}

/// Sum records into weekly buckets (Sunday-Saturday), oldest week first.
pub fn weekly_buckets(records: &[DownloadRecord]) -> Vec<WeeklyBucket> {
    let mut weekly: BTreeMap<NaiveDate, WeeklyBucket> = BTreeMap::new();

    for record in records {
        let start = week_start(record.date);
        let bucket = weekly.entry(start).or_insert(WeeklyBucket {
            week_start: start,
            downloads: 0,
            max_downloads: 0,
        });
        bucket.downloads = bucket.downloads.saturating_add(record.downloads);
        bucket.max_downloads = bucket.max_downloads.max(record.downloads);
    }

    weekly.into_values().collect()
}

/// Group records by country, largest total first.
///
/// Records without a country are skipped.
pub fn country_aggregates(records: &[DownloadRecord]) -> Vec<CountryAggregate> {
    let mut by_country: HashMap<&str, CountryAggregate> = HashMap::new();

    for record in records {
        let Some(country) = record.country.as_deref() else {
            continue;
        };

        let aggregate = by_country
            .entry(country)
            .or_insert_with(|| CountryAggregate {
                country: country.to_string(),
                downloads: 0,
                versions: BTreeMap::new(),
            });
        aggregate.downloads = aggregate.downloads.saturating_add(record.downloads);
        let version_total = aggregate
            .versions
            .entry(record.version.clone())
            .or_insert(0);
        *version_total = version_total.saturating_add(record.downloads);
    }

    let mut aggregates: Vec<CountryAggregate> = by_country.into_values().collect();
    aggregates.sort_by(|a, b| {
        b.downloads
            .cmp(&a.downloads)
            .then_with(|| a.country.cmp(&b.country))
    });
    aggregates
}

/// Count the distinct countries that appear in the records.
pub fn unique_countries(records: &[DownloadRecord]) -> usize {
    records
        .iter()
        .filter_map(|r| r.country.as_deref())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Map a two-letter country code to a display name.
pub fn country_name(code: &str) -> &str {
    match code {
        "US" => "United States",
        "GB" => "United Kingdom",
        "DE" => "Germany",
        "FR" => "France",
        "JP" => "Japan",
        "CN" => "China",
        "CA" => "Canada",
        "AU" => "Australia",
        "IT" => "Italy",
        "ES" => "Spain",
        "NL" => "Netherlands",
        "BR" => "Brazil",
        "RU" => "Russia",
        "IN" => "India",
        "KR" => "South Korea",
        "SE" => "Sweden",
        "CH" => "Switzerland",
        "NO" => "Norway",
        "DK" => "Denmark",
        "FI" => "Finland",
        "BE" => "Belgium",
        "AT" => "Austria",
        "PL" => "Poland",
        "IE" => "Ireland",
        "SG" => "Singapore",
        "HK" => "Hong Kong",
        "TW" => "Taiwan",
        "NZ" => "New Zealand",
        "IL" => "Israel",
        "TR" => "Turkey",
        "ZA" => "South Africa",
        "MX" => "Mexico",
        "AR" => "Argentina",
        "CL" => "Chile",
        "CO" => "Colombia",
        "PE" => "Peru",
        "VE" => "Venezuela",
        "MY" => "Malaysia",
        "TH" => "Thailand",
        "ID" => "Indonesia",
        "PH" => "Philippines",
        "VN" => "Vietnam",
        "SA" => "Saudi Arabia",
        "AE" => "United Arab Emirates",
        "EG" => "Egypt",
        "MA" => "Morocco",
        "HR" => "Croatia",
        other => other,
    }
}
