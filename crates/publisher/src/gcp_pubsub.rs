//! Google Cloud Pub/Sub publisher
//!
//! Publishes through the REST surface with bearer tokens from the
//! ambient credentials (service account, workload identity, or local
//! gcloud login). Topic URLs keep the legacy `gcppubsub://` form used
//! by existing deployments.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{PublishError, Publisher};

pub const PUBLISHER_TYPE: &str = "gcp_pubsub";

const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcpPubSubConfig {
    /// Topic URL, e.g. `gcppubsub://projects/my-project/topics/feeds`.
    pub url: String,
}

/// Extracts `projects/<p>/topics/<t>` from the configured URL. Accepts
/// the legacy `gcppubsub://` scheme and the bare resource path.
fn topic_path(url: &str) -> Result<String, PublishError> {
    let path = url
        .strip_prefix("gcppubsub://")
        .unwrap_or(url)
        .trim_matches('/');
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "topics", topic] if !project.is_empty() && !topic.is_empty() => {
            Ok(format!("projects/{project}/topics/{topic}"))
        }
        _ => Err(PublishError::Config(format!(
            "invalid pub/sub topic URL: {url}"
        ))),
    }
}

pub struct GcpPubSubPublisher {
    client: reqwest::Client,
    auth: gcp_auth::AuthenticationManager,
    publish_url: String,
}

impl GcpPubSubPublisher {
    pub async fn new(url: &str) -> Result<Self, PublishError> {
        let topic = topic_path(url)?;
        let auth = gcp_auth::AuthenticationManager::new()
            .await
            .map_err(|err| PublishError::Config(err.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            auth,
            publish_url: format!("https://pubsub.googleapis.com/v1/{topic}:publish"),
        })
    }

    pub async fn from_config(config: GcpPubSubConfig) -> Result<Self, PublishError> {
        Self::new(&config.url).await
    }
}

#[async_trait]
impl Publisher for GcpPubSubPublisher {
    async fn send(&self, body: &[u8]) -> Result<(), PublishError> {
        let token = self
            .auth
            .get_token(&[PUBSUB_SCOPE])
            .await
            .map_err(|err| PublishError::Delivery(err.to_string()))?;

        let payload = json!({
            "messages": [{"data": BASE64.encode(body)}]
        });

        let response = self
            .client
            .post(&self.publish_url)
            .bearer_auth(token.as_str())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::UnsuccessfulRequest { status });
        }
        debug!(url = %self.publish_url, "published message to pub/sub");
        Ok(())
    }

    fn name(&self) -> &'static str {
        PUBLISHER_TYPE
    }
}
