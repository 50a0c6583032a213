// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download statistics dashboard for a Python package.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,download_dashboard=info";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    download_dashboard::dispatch::dispatch().await
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
