//! Configuration for the feedstock service
//!
//! YAML configuration merged over built-in defaults, with strict field
//! checking: an unknown key anywhere in the file is a startup error.
//! The config also owns component wiring, turning feed and publisher
//! sections into live drivers and sinks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use feedstock_drivers::{
    crates_io, github, goproxy, maven, npm, nuget, packagist, pypi, pypi_artifacts, rubygems,
    FeedDriver,
};
use feedstock_events::{Filter, Handler, LoggingSink, LOGGING_SINK_TYPE};
use feedstock_publisher::{
    GcpPubSubConfig, GcpPubSubPublisher, HttpPublisher, HttpPublisherConfig, KafkaConfig,
    KafkaPublisher, PublishError, Publisher, StdoutPublisher,
};
use feedstock_types::{FeedError, FeedOptions};

/// Environment variable forcing the GCP Pub/Sub publisher, kept for
/// deployments predating the `publisher` config section.
const TOPIC_URL_ENV: &str = "OSSMALWARE_TOPIC_URL";

const PORT_ENV: &str = "PORT";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("unknown feed type: {0}")]
    UnknownFeedType(String),

    #[error("unknown sink type: {0}")]
    UnknownSinkType(String),

    #[error("failed to parse `{rate}` as duration: {message}")]
    InvalidPollRate { rate: String, message: String },

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Publisher(#[from] PublishError),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Feeds to poll.
    pub feeds: Vec<FeedConfig>,

    /// Where polled packages are sent.
    pub publisher: PublisherConfig,

    pub http_port: u16,

    /// Global poll rate: the initial cutoff window and, when `timer` is
    /// on, the default schedule for feeds without their own rate.
    pub poll_rate: String,

    /// Enables the default schedule for feeds without a per-feed rate.
    /// Off by default so unscheduled feeds are driven purely by HTTP.
    pub timer: bool,

    /// Operator event routing. Absent means events are dropped.
    pub events: Option<EventsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let firehose = |feed_type: &str| FeedConfig {
            feed_type: feed_type.to_string(),
            options: FeedOptions::default(),
        };
        Self {
            feeds: vec![
                firehose(crates_io::FEED_NAME),
                firehose(goproxy::FEED_NAME),
                FeedConfig {
                    feed_type: npm::FEED_NAME.to_string(),
                    // The npm window is short; poll it faster than the
                    // global default.
                    options: FeedOptions {
                        packages: None,
                        poll_rate: "2m".to_string(),
                    },
                },
                firehose(nuget::FEED_NAME),
                firehose(packagist::FEED_NAME),
                firehose(pypi::FEED_NAME),
                firehose(rubygems::FEED_NAME),
            ],
            publisher: PublisherConfig::Stdout,
            http_port: 8080,
            poll_rate: "5m".to_string(),
            timer: false,
            events: None,
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file merged over the defaults,
    /// then applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// Loads configuration from YAML text; used by tests and embedded
    /// deployments.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.apply_env();
        Ok(config)
    }

    /// The built-in configuration with environment overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(TOPIC_URL_ENV) {
            if !url.is_empty() {
                self.publisher = PublisherConfig::GcpPubSub(GcpPubSubConfig { url });
            }
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            if let Ok(port) = port.parse::<u16>() {
                self.http_port = port;
            }
        }
    }

    /// The global cutoff window parsed from `poll_rate`.
    pub fn initial_cutoff(&self) -> Result<Duration> {
        parse_rate(&self.poll_rate)
    }

    /// Builds every configured feed driver, keyed by feed type.
    pub fn scheduled_feeds(&self) -> Result<HashMap<String, Arc<dyn FeedDriver>>> {
        let event_handler = self.event_handler()?;
        let mut drivers: HashMap<String, Arc<dyn FeedDriver>> = HashMap::new();
        for feed in &self.feeds {
            let driver = feed.to_driver(&event_handler)?;
            drivers.insert(feed.feed_type.clone(), driver);
        }
        Ok(drivers)
    }

    /// Builds the event handler from the `events` section, or a null
    /// handler when the section is absent.
    pub fn event_handler(&self) -> Result<Handler> {
        match &self.events {
            None => Ok(Handler::null()),
            Some(events) => events.to_event_handler(),
        }
    }
}

/// Parses a duration string such as `"5m"` or `"90s"`.
pub fn parse_rate(rate: &str) -> Result<Duration> {
    humantime::parse_duration(rate).map_err(|err| ConfigError::InvalidPollRate {
        rate: rate.to_string(),
        message: err.to_string(),
    })
}

/// One entry of the `feeds` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(rename = "type")]
    pub feed_type: String,
    #[serde(default)]
    pub options: FeedOptions,
}

impl FeedConfig {
    /// Constructs the driver this entry names.
    pub fn to_driver(&self, event_handler: &Handler) -> Result<Arc<dyn FeedDriver>> {
        let options = self.options.clone();
        let driver: Arc<dyn FeedDriver> = match self.feed_type.as_str() {
            crates_io::FEED_NAME => {
                Arc::new(crates_io::CratesDriver::new(options, event_handler.clone())?)
            }
            goproxy::FEED_NAME => Arc::new(goproxy::GoProxyDriver::new(options)?),
            npm::FEED_NAME => Arc::new(npm::NpmDriver::new(options, event_handler.clone())?),
            nuget::FEED_NAME => Arc::new(nuget::NugetDriver::new(options)?),
            packagist::FEED_NAME => Arc::new(packagist::PackagistDriver::new(options)?),
            pypi::FEED_NAME => Arc::new(pypi::PypiDriver::new(options, event_handler.clone())?),
            pypi_artifacts::FEED_NAME => {
                Arc::new(pypi_artifacts::PypiArtifactsDriver::new(options)?)
            }
            rubygems::FEED_NAME => {
                Arc::new(rubygems::RubyGemsDriver::new(options, event_handler.clone())?)
            }
            maven::FEED_NAME => Arc::new(maven::MavenDriver::new(options)?),
            github::FEED_NAME => Arc::new(github::GithubDriver::new(options)?),
            other => return Err(ConfigError::UnknownFeedType(other.to_string())),
        };
        Ok(driver)
    }
}

/// The `publisher` section. The `type` tag selects the backend and
/// `config` is decoded strictly against that backend's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum PublisherConfig {
    #[serde(rename = "stdout")]
    Stdout,
    #[serde(rename = "gcp_pubsub")]
    GcpPubSub(GcpPubSubConfig),
    #[serde(rename = "kafka")]
    Kafka(KafkaConfig),
    #[serde(rename = "http-client")]
    HttpClient(HttpPublisherConfig),
}

impl PublisherConfig {
    /// Constructs the configured publisher backend.
    pub async fn to_publisher(&self) -> Result<Arc<dyn Publisher>> {
        let publisher: Arc<dyn Publisher> = match self {
            PublisherConfig::Stdout => Arc::new(StdoutPublisher::new()),
            PublisherConfig::GcpPubSub(config) => {
                Arc::new(GcpPubSubPublisher::from_config(config.clone()).await?)
            }
            PublisherConfig::Kafka(config) => {
                Arc::new(KafkaPublisher::from_config(config.clone())?)
            }
            PublisherConfig::HttpClient(config) => {
                Arc::new(HttpPublisher::from_config(config.clone()))
            }
        };
        Ok(publisher)
    }
}

/// The `events` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    pub sink: String,
    #[serde(default)]
    pub filter: Filter,
}

impl EventsConfig {
    pub fn to_event_handler(&self) -> Result<Handler> {
        match self.sink.as_str() {
            LOGGING_SINK_TYPE => Ok(Handler::new(
                Arc::new(LoggingSink::new()),
                self.filter.clone(),
            )),
            other => Err(ConfigError::UnknownSinkType(other.to_string())),
        }
    }
}
