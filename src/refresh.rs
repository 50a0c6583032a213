// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic refresh of the dashboard feeds.
//!
//! The [`Orchestrator`] owns the published [`DashboardState`]. Each cycle fetches
//! all three feeds concurrently and, only if every feed succeeds, replaces the
//! snapshot in one step. A failed cycle keeps the previous snapshot and sets
//! the error message instead.

use crate::config::{Config, FeedsConfig};
use crate::feeds::{Feed, FeedClient};
use crate::parse::{self, ParsePolicy};
use crate::record::{GithubStats, GitterStats};
use crate::retry::{self, RetryError, RetryPolicy, Sleeper, TokioSleeper};
use crate::snapshot::Snapshot;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to fetch {feed} feed: {source}")]
    Fetch {
        feed: Feed,
        #[source]
        source: RetryError,
    },

    #[error("failed to decode {feed} feed: {source}")]
    Decode {
        feed: Feed,
        #[source]
        source: serde_json::Error,
    },
}

/// What subscribers see: the last good snapshot and the last cycle's error.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub snapshot: Option<Arc<Snapshot>>,
    /// Set when the most recent cycle failed. The snapshot is then stale.
    pub error: Option<String>,
    /// Number of completed cycles, successful or not.
    pub cycles: u64,
}

pub struct Orchestrator {
    client: Arc<dyn FeedClient>,
    sleeper: Arc<dyn Sleeper>,
    feeds: FeedsConfig,
    policy: RetryPolicy,
    parse_policy: ParsePolicy,
    interval: Duration,
    generation: AtomicU64,
    state: watch::Sender<DashboardState>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn FeedClient>, config: &Config) -> Self {
        let (state, _) = watch::channel(DashboardState::default());
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            feeds: config.feeds.clone(),
            policy: config.refresh.retry_policy(),
            parse_policy: config.parsing.policy,
            interval: config.refresh.interval().max(MIN_INTERVAL),
            generation: AtomicU64::new(0),
            state,
        }
    }

    /// Replace the sleeper used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Receive every state published from now on.
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    /// Run one cycle and publish its result.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, CycleError> {
        match self.fetch_all().await {
            Ok((csv, github, gitter)) => {
                let fetched_at = Utc::now();
                let outcome = parse::parse_csv_with(&csv, self.parse_policy);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let snapshot = Arc::new(Snapshot::build(
                    generation, outcome, github, gitter, fetched_at,
                ));

                self.state.send_modify(|state| {
                    state.snapshot = Some(Arc::clone(&snapshot));
                    state.error = None;
                    state.cycles += 1;
                });

                info!(
                    generation,
                    records = snapshot.records.len(),
                    "published dashboard snapshot"
                );
                Ok(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "refresh cycle failed, keeping previous snapshot");
                let message = format!("Failed to load download statistics: {}", err);
                self.state.send_modify(|state| {
                    state.error = Some(message);
                    state.cycles += 1;
                });
                Err(err)
            }
        }
    }

    /// Run a cycle now and then on every interval until the handle is shut down.
    pub fn spawn(self: Arc<Self>) -> RefreshHandle {
        let (retry_tx, mut retry_rx) = mpsc::channel(1);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    Some(()) = retry_rx.recv() => ticker.reset(),
                    _ = shutdown_rx.changed() => break,
                }

                // Failures are published through the state.
                let _ = self.refresh().await;
            }
        });

        RefreshHandle {
            retry_tx,
            shutdown_tx,
            task: Some(task),
        }
    }

    async fn fetch_all(&self) -> Result<(String, GithubStats, GitterStats), CycleError> {
        let (csv, github, gitter) = tokio::try_join!(
            self.fetch(Feed::Downloads, &self.feeds.downloads),
            self.fetch(Feed::Github, &self.feeds.github),
            self.fetch(Feed::Gitter, &self.feeds.gitter),
        )?;

        Ok((
            csv,
            decode(Feed::Github, &github)?,
            decode(Feed::Gitter, &gitter)?,
        ))
    }

    async fn fetch(&self, feed: Feed, url: &str) -> Result<String, CycleError> {
        retry::retry(&self.policy, self.sleeper.as_ref(), url, || {
            self.client.fetch_text(url)
        })
        .await
        .map_err(|source| CycleError::Fetch { feed, source })
    }
}

fn decode<T: DeserializeOwned>(feed: Feed, body: &str) -> Result<T, CycleError> {
    serde_json::from_str(body).map_err(|source| CycleError::Decode { feed, source })
}

/// Controls a background refresh loop started with [`Orchestrator::spawn`].
///
/// Dropping the handle aborts the loop.
pub struct RefreshHandle {
    retry_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Start a cycle now instead of waiting for the next tick.
    pub fn retry_now(&self) {
        // A full channel means a retry is already queued.
        let _ = self.retry_tx.try_send(());
    }

    /// Stop the loop, waiting for an in-flight cycle to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FetchError;
    use crate::retry::tests::RecordingSleeper;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    const DOWNLOADS_URL: &str = "https://feeds.test/downloads.csv";
    const GITHUB_URL: &str = "https://feeds.test/github.json";
    const GITTER_URL: &str = "https://feeds.test/gitter.json";

    const CSV_V1: &str = "download_date,country,package_version,download_count\n\
                          2024-01-01,US,1.0.0,10\n\
                          2024-01-02,DE,1.1.0,5\n";
    const CSV_V2: &str = "download_date,country,package_version,download_count\n\
                          2024-01-03,US,2.0.0,100\n";
    const GITHUB_JSON: &str =
        r#"{"post_cnt": 3, "comment_cnt": 9, "post_authors": 2, "date": "2024-01-02"}"#;
    const GITTER_JSON: &str = r#"{"post_cnt": 12, "unique_users_with_posts": 4, "avg_posts_per_user": 3.0, "date": "2024-01-02"}"#;

    #[derive(Default)]
    struct FakeClient {
        bodies: Mutex<HashMap<String, String>>,
        failing: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn serving(csv: &str) -> Arc<Self> {
            let client = Self::default();
            client.set(DOWNLOADS_URL, csv);
            client.set(GITHUB_URL, GITHUB_JSON);
            client.set(GITTER_URL, GITTER_JSON);
            Arc::new(client)
        }

        fn set(&self, url: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
        }

        fn fail(&self, url: &str) {
            self.failing.lock().unwrap().insert(url.to_string());
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.as_str() == url)
                .count()
        }
    }

    #[async_trait]
    impl FeedClient for FakeClient {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.lock().unwrap().contains(url) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                    body: String::new(),
                });
            }
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                    body: String::new(),
                })
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.feeds = FeedsConfig {
            downloads: DOWNLOADS_URL.to_string(),
            github: GITHUB_URL.to_string(),
            gitter: GITTER_URL.to_string(),
        };
        config.refresh.interval_secs = 3600;
        config
    }

    fn orchestrator(client: Arc<FakeClient>, sleeper: Arc<RecordingSleeper>) -> Orchestrator {
        Orchestrator::new(client, &test_config()).with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let client = FakeClient::serving(CSV_V1);
        let orchestrator = orchestrator(client, Arc::default());
        let mut rx = orchestrator.subscribe();

        let snapshot = orchestrator.refresh().await.unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.stats.total_downloads, 15);
        assert_eq!(snapshot.github.post_cnt, 3);
        assert_eq!(snapshot.gitter.unique_users_with_posts, 4);

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert!(state.error.is_none());
        assert_eq!(state.cycles, 1);
        assert!(Arc::ptr_eq(state.snapshot.as_ref().unwrap(), &snapshot));
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_previous_snapshot() {
        let client = FakeClient::serving(CSV_V1);
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator = orchestrator(Arc::clone(&client), Arc::clone(&sleeper));

        let before = orchestrator.refresh().await.unwrap();

        // The downloads feed changes but the GitHub feed is down.
        client.set(DOWNLOADS_URL, CSV_V2);
        client.fail(GITHUB_URL);

        let err = orchestrator.refresh().await.unwrap_err();
        match &err {
            CycleError::Fetch { feed, source } => {
                assert_eq!(*feed, Feed::Github);
                assert_eq!(source.attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.calls_to(GITHUB_URL), 1 + 3);
        assert!(
            sleeper
                .sleeps
                .lock()
                .unwrap()
                .iter()
                .all(|d| *d == Duration::from_secs(2))
        );

        let state = orchestrator.current();
        let after = state.snapshot.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.generation, 1);
        assert_eq!(after.stats.total_downloads, 15);
        assert_eq!(after.stats.latest_version, "1.1.0");
        assert!(state.error.unwrap().contains("github"));
        assert_eq!(state.cycles, 2);
    }

    #[tokio::test]
    async fn test_first_cycle_failure_has_no_snapshot() {
        let client = FakeClient::serving(CSV_V1);
        client.fail(DOWNLOADS_URL);
        let orchestrator = orchestrator(client, Arc::default());

        assert!(orchestrator.refresh().await.is_err());
        let state = orchestrator.current();
        assert!(state.snapshot.is_none());
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_retried() {
        let client = FakeClient::serving(CSV_V1);
        client.set(GITTER_URL, "<html>not json</html>");
        let orchestrator = orchestrator(Arc::clone(&client), Arc::default());

        let err = orchestrator.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Decode {
                feed: Feed::Gitter,
                ..
            }
        ));
        assert_eq!(client.calls_to(GITTER_URL), 1);
        assert!(orchestrator.current().snapshot.is_none());
    }

    #[tokio::test]
    async fn test_success_clears_error() {
        let client = FakeClient::serving(CSV_V1);
        client.fail(GITTER_URL);
        let orchestrator = orchestrator(Arc::clone(&client), Arc::default());

        assert!(orchestrator.refresh().await.is_err());
        assert!(orchestrator.current().error.is_some());

        client.failing.lock().unwrap().clear();
        let snapshot = orchestrator.refresh().await.unwrap();
        let state = orchestrator.current();
        assert!(state.error.is_none());
        assert_eq!(snapshot.generation, 1);
    }

    /// Let the spawned loop run until it is blocked again.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn generation(rx: &mut watch::Receiver<DashboardState>) -> u64 {
        rx.borrow_and_update()
            .snapshot
            .as_ref()
            .map_or(0, |snapshot| snapshot.generation)
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_refreshes_every_interval() {
        let client = FakeClient::serving(CSV_V1);
        let mut config = test_config();
        config.refresh.interval_secs = 60;
        let orchestrator = Arc::new(
            Orchestrator::new(Arc::clone(&client) as Arc<dyn FeedClient>, &config)
                .with_sleeper(Arc::new(RecordingSleeper::default())),
        );
        let mut rx = orchestrator.subscribe();
        let handle = Arc::clone(&orchestrator).spawn();

        // Startup cycle.
        rx.changed().await.unwrap();
        assert_eq!(generation(&mut rx), 1);

        tokio::time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert!(!rx.has_changed().unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        rx.changed().await.unwrap();
        assert_eq!(generation(&mut rx), 2);

        // A manual refresh at t=90 pushes the next tick from t=120 to t=150.
        tokio::time::advance(Duration::from_secs(30)).await;
        handle.retry_now();
        rx.changed().await.unwrap();
        assert_eq!(generation(&mut rx), 3);

        tokio::time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(client.calls_to(DOWNLOADS_URL), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        rx.changed().await.unwrap();
        assert_eq!(generation(&mut rx), 4);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawned_loop_refreshes_on_demand() {
        let client = FakeClient::serving(CSV_V1);
        let orchestrator = Arc::new(orchestrator(Arc::clone(&client), Arc::default()));
        let mut rx = orchestrator.subscribe();

        let handle = Arc::clone(&orchestrator).spawn();

        // The first cycle runs immediately.
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let first = rx.borrow_and_update().snapshot.clone().unwrap();
        assert_eq!(first.stats.total_downloads, 15);

        client.set(DOWNLOADS_URL, CSV_V2);
        handle.retry_now();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        let second = rx.borrow_and_update().snapshot.clone().unwrap();
        assert_eq!(second.generation, 2);
        assert_eq!(second.stats.latest_version, "2.0.0");

        handle.shutdown().await;
    }
}
