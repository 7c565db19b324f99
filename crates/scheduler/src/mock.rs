//! Deterministic drivers and publishers for scheduler tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use feedstock_drivers::{FeedDriver, PollResult};
use feedstock_publisher::{PublishError, Publisher};
use feedstock_types::{apply_cutoff, find_cutoff, FeedError, FeedOptions, Package};

/// Driver returning a configurable fixed release list, with optional
/// failure, panic and delay behaviors.
pub(crate) struct MockDriver {
    name: &'static str,
    options: FeedOptions,
    packages: StdMutex<Vec<Package>>,
    fail: AtomicBool,
    panic: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
}

impl MockDriver {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            options: FeedOptions::default(),
            packages: StdMutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_packages(self, packages: Vec<Package>) -> Self {
        *self.packages.lock().unwrap() = packages;
        self
    }

    pub(crate) fn with_poll_rate(mut self, rate: &str) -> Self {
        self.options.poll_rate = rate.to_string();
        self
    }

    pub(crate) fn with_failure(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_panic(self) -> Self {
        self.panic.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_packages(&self, packages: Vec<Package>) {
        *self.packages.lock().unwrap() = packages;
    }

    pub(crate) fn clear_failure(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedDriver for MockDriver {
    async fn latest(&self, cutoff: DateTime<Utc>) -> PollResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(concurrent, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.panic.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("mock driver panic");
        } else if self.fail.load(Ordering::SeqCst) {
            PollResult::failure(
                cutoff,
                vec![FeedError::decode("mock", "mock driver failure")],
            )
        } else {
            let packages = self.packages.lock().unwrap().clone();
            let new_cutoff = find_cutoff(cutoff, &packages);
            PollResult::new(apply_cutoff(packages, cutoff), new_cutoff, Vec::new())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn options(&self) -> &FeedOptions {
        &self.options
    }
}

/// Publisher recording every delivered body, optionally rejecting
/// bodies containing a marker string.
#[derive(Default)]
pub(crate) struct MockPublisher {
    sent: StdMutex<Vec<Vec<u8>>>,
    fail_marker: Option<String>,
}

impl MockPublisher {
    pub(crate) fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// The `name` field of every delivered record, in delivery order.
    pub(crate) fn sent_names(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|body| {
                let value: serde_json::Value = serde_json::from_slice(body).ok()?;
                Some(value.get("name")?.as_str()?.to_string())
            })
            .collect()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn send(&self, body: &[u8]) -> Result<(), PublishError> {
        if let Some(marker) = &self.fail_marker {
            if String::from_utf8_lossy(body).contains(marker.as_str()) {
                return Err(PublishError::Delivery("mock delivery failure".to_string()));
            }
        }
        self.sent.lock().unwrap().push(body.to_vec());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
