//! Feed groups
//!
//! A group owns the drivers that share one schedule, plus each driver's
//! watermark. Polling fans out across the drivers in parallel, collects
//! their results, advances watermarks, and hands every surviving
//! package to the publisher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use feedstock_drivers::FeedDriver;
use feedstock_publisher::Publisher;
use feedstock_types::{apply_cutoff, Package};

/// At least one driver reported errors during the tick.
#[derive(Debug, Error)]
#[error("error when polling for packages")]
pub struct PollError;

/// At least one package failed to publish during the tick.
#[derive(Debug, Error)]
#[error("error when publishing packages")]
pub struct PubError;

/// Outcome of one group invocation. The count reflects actual
/// successes regardless of the error sentinels.
#[derive(Debug, Default)]
pub struct GroupResult {
    pub num_published: usize,
    pub poll_err: Option<PollError>,
    pub pub_err: Option<PubError>,
}

impl GroupResult {
    /// Error descriptions in a stable order, for the HTTP response.
    pub fn error_strings(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let Some(err) = &self.poll_err {
            errors.push(err.to_string());
        }
        if let Some(err) = &self.pub_err {
            errors.push(err.to_string());
        }
        errors
    }
}

/// One driver and its watermark. The watermark starts one cutoff window
/// in the past and only ever advances, to the cutoff the driver itself
/// returned.
struct FeedEntry {
    driver: Arc<dyn FeedDriver>,
    last_poll: DateTime<Utc>,
}

/// Drivers sharing one schedule, serialized behind one lock.
pub struct FeedGroup {
    /// Holding this lock is what makes a group invocation exclusive:
    /// the cron path refuses to wait for it (skip-if-still-running),
    /// the HTTP path queues on it.
    entries: Mutex<Vec<FeedEntry>>,
    names: Vec<&'static str>,
    publisher: Arc<dyn Publisher>,
    skipped_ticks: AtomicUsize,
}

impl FeedGroup {
    pub fn new(
        drivers: Vec<Arc<dyn FeedDriver>>,
        publisher: Arc<dyn Publisher>,
        initial_cutoff: Duration,
    ) -> Self {
        let start = Utc::now()
            - chrono::Duration::from_std(initial_cutoff).unwrap_or_else(|_| chrono::Duration::zero());
        let names = drivers.iter().map(|driver| driver.name()).collect();
        let entries = drivers
            .into_iter()
            .map(|driver| FeedEntry {
                driver,
                last_poll: start,
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
            names,
            publisher,
            skipped_ticks: AtomicUsize::new(0),
        }
    }

    /// Names of the member feeds, for logs and registration messages.
    pub fn feed_names(&self) -> &[&'static str] {
        &self.names
    }

    /// Number of timer ticks dropped because the previous invocation
    /// was still running.
    pub fn skipped_ticks(&self) -> usize {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Polls every member feed and publishes the results, waiting for
    /// any in-flight invocation of this group to finish first.
    pub async fn poll_and_publish(&self) -> GroupResult {
        let mut entries = self.entries.lock().await;
        self.run_locked(&mut entries).await
    }

    /// Like [`poll_and_publish`](Self::poll_and_publish), but drops the
    /// invocation if the group is already running.
    pub async fn try_poll_and_publish(&self) -> Option<GroupResult> {
        let mut entries = self.entries.try_lock().ok()?;
        Some(self.run_locked(&mut entries).await)
    }

    /// Timer entry point: runs one tick and logs the outcome. Ticks
    /// arriving while the previous one is still running are dropped so
    /// a slow poll cannot queue up load behind itself.
    pub async fn run(&self) {
        match self.try_poll_and_publish().await {
            Some(result) => {
                if let Some(err) = &result.poll_err {
                    error!(feeds = ?self.names, "{err}");
                }
                if let Some(err) = &result.pub_err {
                    error!(feeds = ?self.names, "{err}");
                }
            }
            None => {
                let skipped = self.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    feeds = ?self.names,
                    skipped,
                    "previous invocation still running, skipping tick"
                );
            }
        }
    }

    async fn run_locked(&self, entries: &mut [FeedEntry]) -> GroupResult {
        let mut result = GroupResult::default();
        let (packages, poll_err) = self.poll(entries).await;
        result.poll_err = poll_err;
        if packages.is_empty() {
            return result;
        }

        info!(num_packages = packages.len(), "publishing packages");
        let (num_published, pub_err) = self.publish(packages).await;
        result.num_published = num_published;
        result.pub_err = pub_err;
        if num_published > 0 {
            info!(num_packages = num_published, "successfully published packages");
        }
        result
    }

    /// Fans out one task per entry and collects the results. One
    /// driver's failure (including a panic) never cancels another.
    async fn poll(&self, entries: &mut [FeedEntry]) -> (Vec<Package>, Option<PollError>) {
        let mut tasks = JoinSet::new();
        for (index, entry) in entries.iter().enumerate() {
            let driver = entry.driver.clone();
            let cutoff = entry.last_poll;
            tasks.spawn(async move { (index, driver.latest(cutoff).await) });
        }

        let mut packages = Vec::new();
        let mut had_error = false;
        while let Some(joined) = tasks.join_next().await {
            let (index, poll) = match joined {
                Ok(output) => output,
                Err(join_err) => {
                    had_error = true;
                    error!(error = %join_err, "feed poll task failed");
                    continue;
                }
            };

            let entry = &mut entries[index];
            let feed = entry.driver.name();
            for err in &poll.errors {
                had_error = true;
                error!(feed, error = %err, "error fetching packages");
            }

            let previous_cutoff = entry.last_poll;
            // The driver's only writer is this invocation, and the
            // watermark never moves backwards.
            entry.last_poll = entry.last_poll.max(poll.new_cutoff);

            // Drivers already filter against the cutoff; filtering again
            // here keeps the no-duplicates invariant even under a driver
            // bug.
            let fresh = apply_cutoff(poll.packages, previous_cutoff);
            for pkg in &fresh {
                debug!(feed, name = %pkg.name, version = %pkg.version, "processing package");
            }
            info!(feed, num_processed = fresh.len(), "packages successfully processed");
            packages.extend(fresh);
        }

        info!(num_packages = packages.len(), "packages processed");
        (packages, had_error.then_some(PollError))
    }

    /// Publishes packages one at a time; a failed send is logged and
    /// counted but never aborts the batch.
    async fn publish(&self, packages: Vec<Package>) -> (usize, Option<PubError>) {
        let total = packages.len();
        let mut published = 0;
        for pkg in packages {
            debug!(
                name = %pkg.name,
                feed = %pkg.feed,
                created_date = %pkg.created_date,
                "sending package upstream"
            );
            let body = match serde_json::to_vec(&pkg) {
                Ok(body) => body,
                Err(err) => {
                    error!(name = %pkg.name, error = %err, "error marshaling package");
                    continue;
                }
            };
            match self.publisher.send(&body).await {
                Ok(()) => published += 1,
                Err(err) => {
                    error!(name = %pkg.name, error = %err, "error sending package to upstream publisher");
                }
            }
        }

        let failed = total - published;
        if failed > 0 {
            error!(num_packages = failed, "failed to publish packages");
        }
        (published, (failed > 0).then_some(PubError))
    }
}
