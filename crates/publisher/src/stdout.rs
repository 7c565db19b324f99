//! Stdout publisher
//!
//! Writes one JSON line per message. The default sink for local runs
//! and the piped-into-another-tool deployment style.

use async_trait::async_trait;
use std::io::Write;

use crate::{PublishError, Publisher};

pub const PUBLISHER_TYPE: &str = "stdout";

#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl StdoutPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn send(&self, body: &[u8]) -> Result<(), PublishError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(body)
            .and_then(|_| stdout.write_all(b"\n"))
            .map_err(|err| PublishError::Delivery(err.to_string()))
    }

    fn name(&self) -> &'static str {
        PUBLISHER_TYPE
    }
}
