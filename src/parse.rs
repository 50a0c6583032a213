// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of the downloads CSV feed into [`DownloadRecord`]s.
//!
//! The feed is semi-trusted: comment lines and a byte-order mark are tolerated,
//! malformed rows are skipped and counted, and a missing header column yields an
//! empty outcome rather than an error.

use crate::record::DownloadRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

const DATE_COLUMN: &str = "download_date";
const COUNTRY_COLUMN: &str = "country";
const VERSION_COLUMN: &str = "package_version";
const DOWNLOADS_COLUMN: &str = "download_count";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// How rows that share a key or carry a bad download count are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Reject rows with a bad download count; keep duplicate rows as-is.
    #[default]
    Strict,
    /// Sum rows sharing `(date, version, country)` and count bad download
    /// counts as zero.
    Merge,
}

/// Structural problems that make the whole feed unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedFormatError {
    #[error("no data lines found in CSV")]
    Empty,

    #[error("required columns not found: {}", .0.join(", "))]
    MissingColumns(Vec<&'static str>),

    #[error("failed to read CSV header: {0}")]
    Header(String),
}

#[derive(Debug, Error)]
enum RowError {
    #[error("expected at least {expected} fields, found {found}")]
    TooShort { expected: usize, found: usize },

    #[error("invalid download count '{0}'")]
    Downloads(String),

    #[error("invalid date '{0}'")]
    Date(String),
}

/// The result of parsing one CSV feed.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Accepted records, sorted by date.
    pub records: Vec<DownloadRecord>,
    /// Number of data rows that were skipped.
    pub rejected_rows: usize,
    /// Set when the feed was structurally unusable.
    pub failure: Option<FeedFormatError>,
}

impl ParseOutcome {
    fn failed(failure: FeedFormatError) -> Self {
        Self {
            records: Vec::new(),
            rejected_rows: 0,
            failure: Some(failure),
        }
    }

    pub fn total_downloads(&self) -> u64 {
        self.records
            .iter()
            .map(|r| r.downloads)
            .fold(0, u64::saturating_add)
    }
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    date: usize,
    country: usize,
    version: usize,
    downloads: usize,
}

impl Columns {
    fn locate(header: &csv::StringRecord) -> Result<Self, FeedFormatError> {
        let names: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |column: &str| names.iter().position(|name| name == column);

        match (
            find(DATE_COLUMN),
            find(COUNTRY_COLUMN),
            find(VERSION_COLUMN),
            find(DOWNLOADS_COLUMN),
        ) {
            (Some(date), Some(country), Some(version), Some(downloads)) => Ok(Self {
                date,
                country,
                version,
                downloads,
            }),
            (date, country, version, downloads) => {
                let missing = [
                    (DATE_COLUMN, date),
                    (COUNTRY_COLUMN, country),
                    (VERSION_COLUMN, version),
                    (DOWNLOADS_COLUMN, downloads),
                ]
                .into_iter()
                .filter(|(_, index)| index.is_none())
                .map(|(name, _)| name)
                .collect();
                Err(FeedFormatError::MissingColumns(missing))
            }
        }
    }

    fn min_fields(&self) -> usize {
        self.date
            .max(self.country)
            .max(self.version)
            .max(self.downloads)
            + 1
    }

    fn extract(
        &self,
        row: &csv::StringRecord,
        policy: ParsePolicy,
    ) -> Result<DownloadRecord, RowError> {
        if row.len() < self.min_fields() {
            return Err(RowError::TooShort {
                expected: self.min_fields(),
                found: row.len(),
            });
        }

        let raw_downloads = &row[self.downloads];
        let downloads = match (raw_downloads.parse::<u64>(), policy) {
            (Ok(n), _) => n,
            (Err(_), ParsePolicy::Merge) => 0,
            (Err(_), ParsePolicy::Strict) => {
                return Err(RowError::Downloads(raw_downloads.to_string()));
            }
        };

        let raw_date = &row[self.date];
        let date = parse_date(raw_date).ok_or_else(|| RowError::Date(raw_date.to_string()))?;

        let country = Some(&row[self.country]).filter(|c| !c.is_empty());
        Ok(DownloadRecord::new(
            date,
            &row[self.version],
            country,
            downloads,
        ))
    }
}

/// Parse a CSV feed with the [`ParsePolicy::Strict`] policy.
pub fn parse_csv(text: &str) -> ParseOutcome {
    parse_csv_with(text, ParsePolicy::Strict)
}

/// Parse a CSV feed into download records.
///
/// Never fails: structural problems are reported through
/// [`ParseOutcome::failure`] together with an empty record set.
pub fn parse_csv_with(text: &str, policy: ParsePolicy) -> ParseOutcome {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let text = text.replace("\r\n", "\n");

    let lines: Vec<&str> = text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    if lines.is_empty() {
        warn!("no valid lines found in CSV");
        return ParseOutcome::failed(FeedFormatError::Empty);
    }

    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All);

    let header = match split_line(&builder, lines[0]) {
        Ok(header) => header,
        Err(err) => {
            warn!(error = %err, "failed to read CSV header");
            return ParseOutcome::failed(FeedFormatError::Header(err.to_string()));
        }
    };

    let columns = match Columns::locate(&header) {
        Ok(columns) => columns,
        Err(err) => {
            warn!(headers = ?header.iter().collect::<Vec<_>>(), "{}", err);
            return ParseOutcome::failed(err);
        }
    };

    let mut records = Vec::new();
    let mut rejected_rows = 0;

    for (index, text) in lines.iter().enumerate().skip(1) {
        // The header is line 1.
        let line = index + 1;
        let result = split_line(&builder, text)
            .map_err(|err| err.to_string())
            .and_then(|row| columns.extract(&row, policy).map_err(|err| err.to_string()));

        match result {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!(line, %reason, "skipping CSV row");
                rejected_rows += 1;
            }
        }
    }

    if policy == ParsePolicy::Merge {
        records = merge_duplicates(records);
    }
    records.sort_by_key(|r| r.date);

    if rejected_rows > 0 {
        warn!(rejected_rows, "encountered errors while parsing CSV");
    }
    if records.is_empty() {
        warn!("no valid records were parsed from CSV");
    } else {
        info!(records = records.len(), "parsed download records");
    }

    ParseOutcome {
        records,
        rejected_rows,
        failure: None,
    }
}

/// Split one line into fields.
///
/// Every line is read on its own so an unbalanced quote cannot run into the
/// lines after it.
fn split_line(builder: &csv::ReaderBuilder, line: &str) -> Result<csv::StringRecord, csv::Error> {
    let mut record = csv::StringRecord::new();
    builder.from_reader(line.as_bytes()).read_record(&mut record)?;
    Ok(record)
}

/// Sum records sharing the same `(date, version, country)` key.
fn merge_duplicates(records: Vec<DownloadRecord>) -> Vec<DownloadRecord> {
    let mut merged: BTreeMap<(NaiveDate, String, Option<String>), u64> = BTreeMap::new();

    for record in records {
        let downloads = merged
            .entry((record.date, record.version, record.country))
            .or_insert(0);
        *downloads = downloads.saturating_add(record.downloads);
    }

    merged
        .into_iter()
        .map(|((date, version, country), downloads)| DownloadRecord {
            date,
            downloads,
            version,
            country,
        })
        .collect()
}

/// Parse a calendar date from the formats seen in download exports.
///
/// Timestamps are accepted too; zoned timestamps are converted to UTC before
/// the date is taken.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let value = value.strip_suffix(" UTC").unwrap_or(value);

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc).date_naive());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|dt| dt.date())
            })
        })
}
