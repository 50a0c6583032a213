// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download statistics dashboard: feed ingestion, aggregation and periodic refresh.

pub mod aggregate;
pub mod charts;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod feeds;
pub mod format;
pub mod parse;
pub mod record;
pub mod refresh;
pub mod retry;
pub mod snapshot;
pub mod stats;
