//! # Notification Services
//!
//! Push notification delivery for availability alerts. Delivery is best-effort:
//! callers log a [`NotificationError`] and move on.

/// Error and message types for push notifications
pub mod types;
pub use types::*;

/// Push senders (FCM over HTTP, and a logging sender for development)
pub mod service;
pub use service::*;
