use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Errors raised while delivering a push notification.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// No device registration token has been received yet.
    #[error("No push registration token configured")]
    MissingToken,

    /// The push service could not be reached.
    #[error("Push transport error: {0}")]
    Transport(String),

    /// The push service answered with a non-success status.
    #[error("Push rejected with HTTP {0}: {1}")]
    Rejected(u16, String),

    /// Sender configuration is incomplete.
    #[error("Push configuration error: {0}")]
    Config(String),
}

/// A single push message addressed to one device token.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    /// Device registration token
    pub token: String,
    /// Notification title shown by the device
    pub title: String,
    /// Notification body shown by the device
    pub body: String,
    /// Data payload delivered alongside the notification
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    /// Build a message carrying the title, body, send time and unread flag in its data payload.
    pub fn new(token: &str, title: &str, body: &str, sent_at: DateTime<Utc>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("title".to_string(), title.to_string());
        data.insert("body".to_string(), body.to_string());
        data.insert("timestamp".to_string(), sent_at.to_rfc3339());
        data.insert("unread".to_string(), "true".to_string());

        Self {
            token: token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        }
    }

    /// Request body in the FCM HTTP v1 `messages:send` shape.
    pub fn to_fcm_body(&self) -> serde_json::Value {
        serde_json::json!({
            "message": {
                "token": self.token,
                "notification": {
                    "title": self.title,
                    "body": self.body,
                },
                "data": self.data,
            }
        })
    }
}
