//! Schedule construction and the run loop

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use feedstock_drivers::FeedDriver;
use feedstock_publisher::Publisher;

use crate::group::FeedGroup;
use crate::schedule::{Schedule, ScheduleError};
use crate::server;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to parse `{rate}` as duration: {message}")]
    InvalidPollRate { rate: String, message: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("http server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Registry of feeds to run on schedules, plus the HTTP trigger port.
pub struct Scheduler {
    registry: HashMap<String, Arc<dyn FeedDriver>>,
    publisher: Arc<dyn Publisher>,
    http_port: u16,
}

impl Scheduler {
    pub fn new(
        registry: HashMap<String, Arc<dyn FeedDriver>>,
        publisher: Arc<dyn Publisher>,
        http_port: u16,
    ) -> Self {
        Self {
            registry,
            publisher,
            http_port,
        }
    }

    /// Runs the scheduler until the HTTP server exits: spawns one timer
    /// loop per scheduled group and serves the trigger endpoint for the
    /// rest. Schedule parsing happens before anything spawns, so a bad
    /// expression fails startup rather than a background task.
    pub async fn run(
        self,
        initial_cutoff: Duration,
        enable_default_timer: bool,
    ) -> Result<(), SchedulerError> {
        let default_schedule = format!("@every {}", humantime::format_duration(initial_cutoff));
        let schedules = build_schedules(self.registry, self.publisher, initial_cutoff)?;

        let mut http_groups = Vec::new();
        let mut timers = Vec::new();
        for (expression, group) in schedules {
            let feeds = group.feed_names().join(", ");

            let expression = if expression.is_empty() {
                if !enable_default_timer {
                    // Without the default timer, unscheduled feeds are
                    // driven purely by HTTP requests. Keeping them off
                    // cron means a request can never race a timer tick
                    // for the same group.
                    http_groups.push(group);
                    continue;
                }
                default_schedule.clone()
            } else {
                expression
            };

            let schedule = Schedule::parse(&expression)?;
            info!(feeds = %feeds, schedule = %expression, "running a timer");
            timers.push((schedule, group));
        }

        for (schedule, group) in timers {
            tokio::spawn(run_on_schedule(schedule, group));
        }

        server::serve(http_groups, self.http_port).await
    }
}

/// One group's timer loop. Ticks fire on schedule regardless of how
/// long the previous invocation takes; each tick runs through the
/// skip-if-still-running entry point, so a slow poll drops overlapping
/// ticks instead of queueing them.
async fn run_on_schedule(schedule: Schedule, group: Arc<FeedGroup>) {
    loop {
        let delay = schedule.next_delay(Utc::now());
        tokio::time::sleep(delay).await;
        let group = group.clone();
        tokio::spawn(async move { group.run().await });
    }
}

/// Partitions the registry into feed groups keyed by schedule
/// expression. Feeds with their own poll rate get an `@every` schedule
/// and an initial cutoff matching that rate; the rest share the `""`
/// key and the global cutoff.
pub fn build_schedules(
    registry: HashMap<String, Arc<dyn FeedDriver>>,
    publisher: Arc<dyn Publisher>,
    initial_cutoff: Duration,
) -> Result<HashMap<String, Arc<FeedGroup>>, SchedulerError> {
    let mut buckets: HashMap<String, (Duration, Vec<Arc<dyn FeedDriver>>)> = HashMap::new();

    for driver in registry.into_values() {
        let rate = driver.options().poll_rate.clone();
        let (key, cutoff) = if rate.is_empty() {
            (String::new(), initial_cutoff)
        } else {
            let duration = humantime::parse_duration(&rate).map_err(|err| {
                SchedulerError::InvalidPollRate {
                    rate: rate.clone(),
                    message: err.to_string(),
                }
            })?;
            (format!("@every {rate}"), duration)
        };
        buckets.entry(key).or_insert_with(|| (cutoff, Vec::new())).1.push(driver);
    }

    Ok(buckets
        .into_iter()
        .map(|(key, (cutoff, drivers))| {
            let group = Arc::new(FeedGroup::new(drivers, publisher.clone(), cutoff));
            (key, group)
        })
        .collect())
}
