use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;

use crate::types::*;

/// Something that can deliver a push notification to a device token.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver `title`/`body` to `token`, returning the provider's message id.
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<String, NotificationError>;
}

/// Configuration for [`FcmPushSender`]
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Full `messages:send` URL of the FCM HTTP v1 API for the project
    pub endpoint: String,
    /// OAuth bearer token authorised for the project
    pub bearer_token: String,
    /// Request timeout
    pub timeout: Duration,
}

impl PushConfig {
    /// Load from `FCM_ENDPOINT` and `FCM_BEARER_TOKEN`; `None` if either is unset.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("FCM_ENDPOINT").ok()?;
        let bearer_token = std::env::var("FCM_BEARER_TOKEN").ok()?;

        Some(Self {
            endpoint,
            bearer_token,
            timeout: Duration::from_secs(10),
        })
    }
}

/// Firebase Cloud Messaging sender over the HTTP v1 API.
#[derive(Debug, Clone)]
pub struct FcmPushSender {
    client: Client,
    config: PushConfig,
}

impl FcmPushSender {
    /// Creates a sender with its own HTTP client.
    pub fn new(config: PushConfig) -> Result<Self, NotificationError> {
        if config.endpoint.is_empty() {
            return Err(NotificationError::Config("empty FCM endpoint".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<String, NotificationError> {
        if token.is_empty() {
            return Err(NotificationError::MissingToken);
        }

        let message = PushMessage::new(token, title, body, Utc::now());

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.bearer_token)
            .json(&message.to_fcm_body())
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if !status.is_success() {
            return Err(NotificationError::Rejected(status.as_u16(), text));
        }

        let message_id = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .unwrap_or(text);

        log::info!("✅ Push sent: {}", message_id);
        Ok(message_id)
    }
}

/// Sender that only logs, and remembers what it was asked to send.
#[derive(Debug, Default)]
pub struct LogPushSender {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl LogPushSender {
    /// Creates an empty logging sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far as `(token, title, body)`.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, token: &str, title: &str, body: &str) -> Result<String, NotificationError> {
        if token.is_empty() {
            return Err(NotificationError::MissingToken);
        }

        log::info!("📱 [MOCK PUSH] To: {}", token);
        log::info!("📱 [MOCK PUSH] {}: {}", title, body);

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotificationError::Transport("sender state poisoned".to_string()))?;
        sent.push((token.to_string(), title.to_string(), body.to_string()));

        Ok(format!("mock-push-{}", sent.len()))
    }
}
