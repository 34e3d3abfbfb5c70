use super::{PushError, PushGateway};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Pushes through an external session gateway's management callback:
/// `POST {base_url}/{connectionId}` with the payload as JSON body.
pub struct HttpCallbackGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCallbackGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn connection_url(&self, connection_id: &str) -> String {
        format!("{}/{}", self.base_url, connection_id)
    }
}

/// Gateway reply status to push outcome; `410 Gone` marks a stale connection.
fn classify(status: StatusCode) -> Result<(), PushError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::GONE {
        Err(PushError::Gone)
    } else {
        Err(PushError::Transport(format!("gateway returned {status}")))
    }
}

#[async_trait]
impl PushGateway for HttpCallbackGateway {
    async fn post_to_connection(&self, connection_id: &str, payload: &Value) -> Result<(), PushError> {
        let response = self
            .client
            .post(self.connection_url(connection_id))
            .json(payload)
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        classify(response.status())
    }
}
