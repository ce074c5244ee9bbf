//! Best-effort operator notifications.
//!
//! Delivery failures are logged and swallowed; they never affect trading.

pub mod messages;
pub mod telegram;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

pub use telegram::TelegramNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Notification capability
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!("[notify] {}", text.replace('\n', " | "));
        Ok(())
    }
}

/// Drops every message
#[derive(Debug, Default, Clone)]
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
        Ok(())
    }
}

/// Fire-and-forget wrapper applying a timeout to every send
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    pub fn log_only() -> Self {
        Self::new(Arc::new(LogNotifier), Duration::from_secs(5))
    }

    pub async fn send(&self, text: &str) {
        match tokio::time::timeout(self.timeout, self.notifier.notify(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to send notification: {}", e),
            Err(_) => tracing::warn!("Notification timed out after {:?}", self.timeout),
        }
    }
}
