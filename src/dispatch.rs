// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and command dispatch.

use crate::{commands, config, export};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file (built-in defaults are used if omitted)
    #[arg(short, long, global = true)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Fetch all feeds once and show the overview
    Summary,

    /// Show weekly download totals
    Weekly {
        /// Number of weeks to show (default: 12)
        #[arg(short = 'n', long, default_value = "12")]
        limit: usize,
    },

    /// Show downloads by country with a per-version breakdown
    Countries {
        /// Number of countries to show (default: from config)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Number of versions to show per country (default: from config)
        #[arg(long)]
        versions: Option<usize>,
    },

    /// Generate charts from the current statistics
    Charts {
        /// Output directory for charts
        #[arg(short, long, default_value = "charts")]
        output: Utf8PathBuf,
    },

    /// Export statistics to various formats
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },

    /// Keep refreshing in the background and print each update
    Watch,
}

#[derive(Parser, Debug)]
enum ExportType {
    /// Export to CSV format
    Csv {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// What to export: 'records', 'weekly', 'countries'
        #[arg(short = 't', long, default_value = "records")]
        table: String,
    },

    /// Export to JSON format
    Json {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// What to export: 'records', 'weekly', 'countries', 'snapshot'
        #[arg(short = 't', long, default_value = "records")]
        table: String,
    },
}

/// Parse arguments and dispatch to the appropriate command.
pub async fn dispatch() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::Config::load(path).context("failed to load configuration")?,
        None => config::Config::default(),
    };

    match args.command {
        Command::Summary => commands::run_summary(&config).await?,
        Command::Weekly { limit } => commands::run_weekly(&config, limit).await?,
        Command::Countries { limit, versions } => {
            commands::run_countries(&config, limit, versions).await?
        }
        Command::Charts { output } => commands::run_charts(&config, &output).await?,
        Command::Export { export_type } => {
            let export_kind = match export_type {
                ExportType::Csv { output, table } => export::ExportKind::Csv {
                    output: output.to_string(),
                    table,
                },
                ExportType::Json { output, table } => export::ExportKind::Json {
                    output: output.to_string(),
                    table,
                },
            };
            commands::run_export(&config, export_kind).await?;
        }
        Command::Watch => commands::run_watch(&config).await?,
    }

    Ok(())
}
