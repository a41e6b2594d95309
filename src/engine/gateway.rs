use async_trait::async_trait;
use thiserror::Error;

use crate::models::broadcast::MessagePayload;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("push request failed: {0}")]
    Request(String),

    #[error("push rejected with status {0}")]
    Rejected(u16),
}

/// Outbound messaging seam. One call per recipient; the delivery engine
/// captures results instead of propagating them.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_to_recipient(
        &self,
        recipient_id: &str,
        payload: &MessagePayload,
    ) -> Result<(), GatewayError>;
}

/// Bearer-token push API client (LINE-style `{to, messages: [...]}` body).
pub struct HttpPushGateway {
    client: reqwest::Client,
    endpoint: String,
    channel_token: String,
}

impl HttpPushGateway {
    pub fn new(endpoint: String, channel_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            channel_token,
        }
    }
}

#[async_trait]
impl MessagingGateway for HttpPushGateway {
    async fn send_to_recipient(
        &self,
        recipient_id: &str,
        payload: &MessagePayload,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "to": recipient_id,
            "messages": [payload],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.channel_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Recording gateway for tests and local runs: stores every send, optionally
/// failing for chosen recipients.
#[derive(Default)]
pub struct InMemoryGateway {
    calls: std::sync::Mutex<Vec<(String, MessagePayload)>>,
    fail_for: std::sync::Mutex<Vec<String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, recipient_id: &str) {
        self.fail_for
            .lock()
            .expect("gateway lock poisoned")
            .push(recipient_id.to_string());
    }

    pub fn calls(&self) -> Vec<(String, MessagePayload)> {
        self.calls.lock().expect("gateway lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("gateway lock poisoned").len()
    }
}

#[async_trait]
impl MessagingGateway for InMemoryGateway {
    async fn send_to_recipient(
        &self,
        recipient_id: &str,
        payload: &MessagePayload,
    ) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .expect("gateway lock poisoned")
            .push((recipient_id.to_string(), payload.clone()));

        let should_fail = self
            .fail_for
            .lock()
            .expect("gateway lock poisoned")
            .iter()
            .any(|id| id == recipient_id);
        if should_fail {
            return Err(GatewayError::Rejected(500));
        }
        Ok(())
    }
}
