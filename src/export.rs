// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CSV and JSON export of snapshot tables.

use crate::aggregate::country_name;
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};

pub enum ExportKind {
    Csv { output: String, table: String },
    Json { output: String, table: String },
}

/// A snapshot table that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Records,
    Weekly,
    Countries,
    /// The whole snapshot; JSON only.
    Snapshot,
}

impl Table {
    /// Resolve a table name for CSV export.
    pub fn for_csv(name: &str) -> Result<Self> {
        match name {
            "records" => Ok(Table::Records),
            "weekly" => Ok(Table::Weekly),
            "countries" => Ok(Table::Countries),
            _ => anyhow::bail!(
                "Unknown table type: {}. Use 'records', 'weekly', or 'countries'",
                name
            ),
        }
    }

    /// Resolve a table name for JSON export.
    pub fn for_json(name: &str) -> Result<Self> {
        match name {
            "snapshot" => Ok(Table::Snapshot),
            _ => Self::for_csv(name).map_err(|_| {
                anyhow::anyhow!(
                    "Unknown table type: {}. Use 'records', 'weekly', 'countries', or 'snapshot'",
                    name
                )
            }),
        }
    }
}

/// One row of the flattened per-country, per-version table.
#[derive(Debug, Serialize)]
struct CountryVersionRow<'a> {
    country: &'a str,
    country_name: &'a str,
    version: &'a str,
    downloads: u64,
}

pub fn run_export(snapshot: &Snapshot, export: ExportKind) -> Result<()> {
    // Resolve the table before touching the output file.
    let (output, table, as_csv) = match &export {
        ExportKind::Csv { output, table } => (output, Table::for_csv(table)?, true),
        ExportKind::Json { output, table } => (output, Table::for_json(table)?, false),
    };
    let output = Utf8Path::new(output);

    let file = File::create(output.as_std_path())
        .with_context(|| format!("failed to create file at {}", output))?;
    let writer = BufWriter::new(file);

    if as_csv {
        write_csv(snapshot, table, writer)?;
    } else {
        write_json(snapshot, table, writer)?;
    }

    println!("Exported to {}.", output);
    Ok(())
}

/// Write one snapshot table as CSV.
pub fn write_csv<W: Write>(snapshot: &Snapshot, table: Table, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    match table {
        Table::Records => {
            for record in &snapshot.records {
                csv.serialize(record)?;
            }
        }
        Table::Weekly => {
            for bucket in &snapshot.weekly {
                csv.serialize(bucket)?;
            }
        }
        Table::Countries => {
            for row in country_rows(snapshot) {
                csv.serialize(row)?;
            }
        }
        Table::Snapshot => anyhow::bail!("the full snapshot can only be exported as JSON"),
    }

    csv.flush().context("failed to write CSV")?;
    Ok(())
}

/// Write one snapshot table as pretty-printed JSON.
pub fn write_json<W: Write>(snapshot: &Snapshot, table: Table, mut writer: W) -> Result<()> {
    match table {
        Table::Records => serde_json::to_writer_pretty(&mut writer, &snapshot.records)?,
        Table::Weekly => serde_json::to_writer_pretty(&mut writer, &snapshot.weekly)?,
        Table::Countries => serde_json::to_writer_pretty(&mut writer, &snapshot.countries)?,
        Table::Snapshot => serde_json::to_writer_pretty(&mut writer, snapshot)?,
    }

    writer.flush().context("failed to write JSON")?;
    Ok(())
}

fn country_rows(snapshot: &Snapshot) -> impl Iterator<Item = CountryVersionRow<'_>> {
    snapshot.countries.iter().flat_map(|country| {
        country
            .versions
            .iter()
            .map(move |(version, downloads)| CountryVersionRow {
                country: &country.country,
                country_name: country_name(&country.country),
                version,
                downloads: *downloads,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_csv;
    use crate::snapshot::tests::{github_stats, gitter_stats};
    use chrono::{TimeZone, Utc};

    fn snapshot() -> Snapshot {
        let csv = "download_date,country,package_version,download_count\n\
                   2024-01-01,US,1.0.0,10\n\
                   2024-01-02,,1.0.0,2\n\
                   2024-01-08,DE,1.1.0,5\n";
        let now = Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap();
        Snapshot::build(1, parse_csv(csv), github_stats(), gitter_stats(), now)
    }

    fn csv_output(table: Table) -> String {
        let mut out = Vec::new();
        write_csv(&snapshot(), table, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_records_csv() {
        assert_eq!(
            csv_output(Table::Records),
            "date,downloads,version,country\n\
             2024-01-01,10,1.0.0,US\n\
             2024-01-02,2,1.0.0,\n\
             2024-01-08,5,1.1.0,DE\n"
        );
    }

    #[test]
    fn test_weekly_csv() {
        assert_eq!(
            csv_output(Table::Weekly),
            "week_start,downloads,max_downloads\n\
             2023-12-31,12,10\n\
             2024-01-07,5,5\n"
        );
    }

    #[test]
    fn test_countries_csv() {
        assert_eq!(
            csv_output(Table::Countries),
            "country,country_name,version,downloads\n\
             US,United States,1.0.0,10\n\
             DE,Germany,1.1.0,5\n"
        );
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::for_csv("weekly").unwrap(), Table::Weekly);
        assert_eq!(Table::for_json("snapshot").unwrap(), Table::Snapshot);
        assert_eq!(Table::for_json("records").unwrap(), Table::Records);
        assert!(Table::for_csv("snapshot").is_err());
        assert!(Table::for_csv("github").is_err());
        assert!(Table::for_json("github").is_err());
    }

    #[test]
    fn test_unknown_table_leaves_existing_file_intact() {
        let path = std::env::temp_dir().join(format!(
            "download-dashboard-export-{}.csv",
            std::process::id()
        ));
        std::fs::write(&path, "keep me\n").unwrap();
        let output = path.to_str().unwrap().to_string();

        for export in [
            ExportKind::Csv {
                output: output.clone(),
                table: "bogus".to_string(),
            },
            ExportKind::Csv {
                output: output.clone(),
                table: "snapshot".to_string(),
            },
            ExportKind::Json {
                output: output.clone(),
                table: "bogus".to_string(),
            },
        ] {
            assert!(run_export(&snapshot(), export).is_err());
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_countries_json() {
        let mut out = Vec::new();
        write_json(&snapshot(), Table::Countries, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["country"], "US");
        assert_eq!(value[0]["downloads"], 10);
        assert_eq!(value[1]["versions"]["1.1.0"], 5);
    }
}
