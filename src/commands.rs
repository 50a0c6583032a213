// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use crate::charts;
use crate::config::Config;
use crate::export::{self, ExportKind};
use crate::feeds::HttpFeedClient;
use crate::format::format_number;
use crate::refresh::{DashboardState, Orchestrator};
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::Local;
use std::sync::Arc;
use tokio::sync::mpsc;

fn orchestrator(config: &Config) -> Orchestrator {
    Orchestrator::new(Arc::new(HttpFeedClient::new()), config)
}

/// Run a single refresh cycle and return its snapshot.
async fn load_snapshot(config: &Config) -> Result<Arc<Snapshot>> {
    println!("Fetching download statistics...");
    orchestrator(config)
        .refresh()
        .await
        .context("failed to load download statistics")
}

/// Run the summary command.
pub async fn run_summary(config: &Config) -> Result<()> {
    let snapshot = load_snapshot(config).await?;
    print_overview(&snapshot);
    Ok(())
}

/// Run the weekly command.
pub async fn run_weekly(config: &Config, limit: usize) -> Result<()> {
    let snapshot = load_snapshot(config).await?;

    println!("\n{:<12} {:>15} {:>15}", "Week of", "Downloads", "Peak record");
    println!("{}", "=".repeat(44));

    for bucket in snapshot.weekly.iter().rev().take(limit) {
        println!(
            "{:<12} {:>15} {:>15}",
            bucket.week_start.format("%Y-%m-%d").to_string(),
            format_number(bucket.downloads),
            format_number(bucket.max_downloads)
        );
    }

    Ok(())
}

/// Run the countries command.
pub async fn run_countries(
    config: &Config,
    limit: Option<usize>,
    versions: Option<usize>,
) -> Result<()> {
    let snapshot = load_snapshot(config).await?;
    let limit = limit.unwrap_or(config.display.top_countries);
    let versions = versions.unwrap_or(config.display.top_versions);

    println!(
        "\nDownloads by country ({} days)\n",
        snapshot.date_range.days
    );

    for country in snapshot.countries.iter().take(limit) {
        println!(
            "{:<24} {:>12}",
            country.name(),
            format_number(country.downloads)
        );
        for (version, downloads) in country.top_versions(versions) {
            println!("    {:<20} {:>12}", version, format_number(downloads));
        }
    }

    Ok(())
}

/// Run the charts command.
pub async fn run_charts(config: &Config, output_dir: &Utf8Path) -> Result<()> {
    let snapshot = load_snapshot(config).await?;
    charts::generate_all_charts(&snapshot, output_dir, config.display.top_countries)
}

/// Run the export command.
pub async fn run_export(config: &Config, export: ExportKind) -> Result<()> {
    let snapshot = load_snapshot(config).await?;
    export::run_export(&snapshot, export)
}

/// Run the watch command: refresh in the background and print every new state.
pub async fn run_watch(config: &Config) -> Result<()> {
    let orchestrator = Arc::new(orchestrator(config));
    let mut state_rx = orchestrator.subscribe();
    let handle = Arc::clone(&orchestrator).spawn();

    println!(
        "Refreshing every {}s. Press Enter to refresh now, Ctrl-C to quit.",
        config.refresh.interval_secs
    );

    let mut enter_rx = spawn_enter_listener();

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                print_state(&state);
            }
            Some(()) = enter_rx.recv() => handle.retry_now(),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    println!("\nStopped.");
    Ok(())
}

/// Forward each line typed on stdin as a manual refresh request.
fn spawn_enter_listener() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_state(state: &DashboardState) {
    if let Some(error) = &state.error {
        println!("\n[error] {}", error);
        match &state.snapshot {
            Some(snapshot) => println!(
                "Showing data from {}. Press Enter to retry.",
                snapshot
                    .fetched_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("No data loaded yet. Press Enter to retry."),
        }
        return;
    }

    if let Some(snapshot) = &state.snapshot {
        print_overview(snapshot);
    }
}

fn print_overview(snapshot: &Snapshot) {
    let range = &snapshot.date_range;
    let stats = &snapshot.stats;

    println!("\nDownload statistics");
    if let Some(feed_error) = &snapshot.feed_error {
        println!("  [warning] downloads feed unusable: {}", feed_error);
    }
    println!("  Last {} days", range.days);
    println!(
        "  {} - {}",
        range.start_date.format("%m/%d/%Y"),
        range.end_date.format("%m/%d/%Y")
    );

    println!();
    println!(
        "  {:<28} {:>12}",
        format!("Downloads ({} days)", range.days),
        format_number(stats.total_downloads)
    );
    println!(
        "  {:<28} {:>12}",
        "Downloads (48h)",
        format_number(snapshot.recent_downloads)
    );
    println!("  {:<28} {:>12}", "Latest version", stats.latest_version);
    println!(
        "  {:<28} {:>12}",
        "Average per version",
        format_number(stats.average_downloads)
    );
    println!(
        "  {:<28} {:>12}",
        format!("Download countries ({} days)", range.days),
        snapshot.unique_countries
    );
    if snapshot.rejected_rows > 0 {
        println!("  {:<28} {:>12}", "Skipped rows", snapshot.rejected_rows);
    }

    let github = &snapshot.github;
    let gitter = &snapshot.gitter;
    println!("\nCommunity");
    println!(
        "  GitHub: {} posts, {} comments, {} authors (as of {})",
        format_number(github.post_cnt),
        format_number(github.comment_cnt),
        format_number(github.post_authors),
        github.date
    );
    println!(
        "  Gitter: {} posts, {} active users, {:.1} posts per user (as of {})",
        format_number(gitter.post_cnt),
        format_number(gitter.unique_users_with_posts),
        gitter.avg_posts_per_user,
        gitter.date
    );

    println!(
        "\nLast updated: {}",
        snapshot
            .fetched_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
}
