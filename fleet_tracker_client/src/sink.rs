use async_trait::async_trait;
use tracing::debug;

use fleet_tracker_lib::location_update::LocationUpdate;

use crate::config::ClientConfig;

/// Errors from the location sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The backend rejected the bearer token. The caller's auth layer
    /// decides whether to drop the stored credential.
    #[error("location sink rejected the credential")]
    Unauthorized,
    #[error("location sink returned status {0}")]
    Status(u16),
    #[error("location sink unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Destination for accepted position fixes.
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn send(&self, update: &LocationUpdate, bearer_token: &str) -> Result<(), SinkError>;
}

/// HTTP sink POSTing to the backend's driver location endpoint.
pub struct HttpLocationSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLocationSink {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.location_sink_url(),
        }
    }
}

#[async_trait]
impl LocationSink for HttpLocationSink {
    async fn send(&self, update: &LocationUpdate, bearer_token: &str) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(bearer_token)
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Location update delivered");
            Ok(())
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(SinkError::Unauthorized)
        } else {
            Err(SinkError::Status(status.as_u16()))
        }
    }
}
