// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chart generation for download statistics visualization.

use crate::aggregate::{CountryAggregate, WeeklyBucket};
use crate::format::format_number;
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{Duration, NaiveDate};
use plotters::coord::types::RangedCoordi64;
use plotters::prelude::*;

const CHART_WIDTH: u32 = 1600;
const CHART_HEIGHT: u32 = 900;

// Typography - Inter font family
const FONT_FAMILY: &str = "Inter";
const TITLE_SIZE: i32 = 24;
const LABEL_SIZE: i32 = 16;
const AXIS_SIZE: i32 = 14;

// Colors - navy background with gold accents
const BACKGROUND: RGBColor = RGBColor(10, 25, 47);
const TEXT_PRIMARY: RGBColor = RGBColor(255, 255, 255);
const TEXT_SECONDARY: RGBColor = RGBColor(148, 163, 184);
const GRID_COLOR: RGBColor = RGBColor(255, 255, 255);
const ACCENT_GOLD: RGBColor = RGBColor(218, 165, 32);
const BAR_COLOR: RGBColor = RGBColor(255, 255, 255);

/// Generate all charts for a snapshot.
pub fn generate_all_charts(
    snapshot: &Snapshot,
    output_dir: &Utf8Path,
    top_countries: usize,
) -> Result<()> {
    std::fs::create_dir_all(output_dir.as_std_path())
        .with_context(|| format!("failed to create output directory at {}", output_dir))?;

    println!("\nGenerating charts...");

    generate_weekly_downloads(&snapshot.weekly, &output_dir.join("weekly-downloads.png"))?;
    generate_country_downloads(
        &snapshot.countries,
        top_countries,
        snapshot.date_range.days,
        &output_dir.join("country-downloads.png"),
    )?;

    println!("  Charts saved to {}", output_dir);
    Ok(())
}

/// Create a styled drawing area with background.
fn create_drawing_area(
    output_path: &Utf8Path,
) -> Result<DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>> {
    let root = BitMapBackend::new(output_path.as_std_path(), (CHART_WIDTH, CHART_HEIGHT))
        .into_drawing_area();
    root.fill(&BACKGROUND)?;
    Ok(root)
}

/// Configure common mesh styling for date-based charts.
fn configure_date_mesh<DB: DrawingBackend>(
    chart: &mut ChartContext<DB, Cartesian2d<RangedDate<NaiveDate>, RangedCoordi64>>,
) -> Result<()>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    chart
        .configure_mesh()
        .bold_line_style(&GRID_COLOR.mix(0.1))
        .light_line_style(&TRANSPARENT)
        .x_labels(8)
        .y_labels(6)
        .x_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .y_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .x_label_formatter(&|date| date.format("%m/%d/%Y").to_string())
        .y_label_formatter(&|y| format_number(*y as u64))
        .disable_x_mesh()
        .draw()?;
    Ok(())
}

/// Generate the weekly downloads trend chart (line chart).
///
/// Each week's marker is shaded by its busiest single record relative to the
/// busiest record overall.
fn generate_weekly_downloads(weekly: &[WeeklyBucket], output_path: &Utf8Path) -> Result<()> {
    let (Some(first), Some(last)) = (weekly.first(), weekly.last()) else {
        return Ok(());
    };

    let root = create_drawing_area(output_path)?;

    let min_date = first.week_start;
    // A single week still needs a non-empty axis.
    let max_date = last.week_start.max(min_date + Duration::days(7));
    let max_downloads = weekly
        .iter()
        .map(|b| b.downloads as i64)
        .max()
        .unwrap_or(0)
        .max(1);
    let peak_record = weekly.iter().map(|b| b.max_downloads).max().unwrap_or(0).max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Weekly Downloads",
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0i64..max_downloads)?;

    configure_date_mesh(&mut chart)?;

    chart.draw_series(AreaSeries::new(
        weekly.iter().map(|b| (b.week_start, b.downloads as i64)),
        0,
        ACCENT_GOLD.mix(0.15),
    ))?;

    chart.draw_series(LineSeries::new(
        weekly.iter().map(|b| (b.week_start, b.downloads as i64)),
        ShapeStyle {
            color: ACCENT_GOLD.to_rgba(),
            filled: true,
            stroke_width: 3,
        },
    ))?;

    chart.draw_series(weekly.iter().map(|b| {
        let intensity = b.max_downloads as f64 / peak_record as f64;
        Circle::new(
            (b.week_start, b.downloads as i64),
            5,
            ACCENT_GOLD.mix(0.5 + intensity * 0.5).filled(),
        )
    }))?;

    root.present()?;
    println!("  • weekly-downloads.png");
    Ok(())
}

/// Generate the downloads-by-country chart (horizontal bars, largest on top).
fn generate_country_downloads(
    countries: &[CountryAggregate],
    top: usize,
    days: u64,
    output_path: &Utf8Path,
) -> Result<()> {
    let countries = &countries[..countries.len().min(top)];
    if countries.is_empty() {
        return Ok(());
    }

    let root = create_drawing_area(output_path)?;

    let rows = countries.len();
    let max_downloads = countries
        .iter()
        .map(|c| c.downloads as i64)
        .max()
        .unwrap_or(0)
        .max(1);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Downloads by Country ({} days)", days),
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(20)
        .build_cartesian_2d(0i64..max_downloads, 0f64..rows as f64)?;

    chart
        .configure_mesh()
        .bold_line_style(&GRID_COLOR.mix(0.1))
        .light_line_style(&TRANSPARENT)
        .x_labels(6)
        .y_labels(0)
        .x_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .x_label_formatter(&|x| format_number(*x as u64))
        .disable_y_mesh()
        .draw()?;

    // Row 0 is drawn at the top.
    let row_top = |idx: usize| (rows - idx) as f64 - 0.15;
    let row_bottom = |idx: usize| (rows - idx - 1) as f64 + 0.15;

    chart.draw_series(countries.iter().enumerate().map(|(idx, country)| {
        Rectangle::new(
            [(0, row_bottom(idx)), (country.downloads as i64, row_top(idx))],
            BAR_COLOR.mix(0.2).filled(),
        )
    }))?;

    let label_style = (FONT_FAMILY, LABEL_SIZE).into_font().color(&TEXT_PRIMARY);
    chart.draw_series(countries.iter().enumerate().map(|(idx, country)| {
        Text::new(
            format!("{}  {}", country.name(), format_number(country.downloads)),
            (0, row_top(idx) - 0.1),
            label_style.clone(),
        )
    }))?;

    root.present()?;
    println!("  • country-downloads.png");
    Ok(())
}
