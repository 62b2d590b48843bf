use async_trait::async_trait;
use serde::Serialize;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;

// 1. Notifier Contract
/// Notifier
///
/// Delivery channel for account notifications. Registration hands the welcome
/// message (with the activation token) to whichever implementation the process was
/// started with: a webhook in deployments, the log locally, a recorder in tests.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, message: &WelcomeMessage) -> Result<(), NotifyError>;
}

pub type NotifierState = Arc<dyn Notifier>;

/// WelcomeMessage
///
/// Payload of the post-registration notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WelcomeMessage {
    pub recipient: String,
    pub name: String,
    pub user_id: i64,
    pub activation_token: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification endpoint responded with status {0}")]
    Rejected(u16),
    #[error("notification failed: {0}")]
    Other(String),
}

/// send_in_background
///
/// Fire-and-forget delivery. The caller's response never waits on the notifier and a
/// failure (or panic) inside the task is only logged.
pub fn send_in_background(notifier: NotifierState, message: WelcomeMessage) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.send_welcome(&message).await {
            Ok(()) => tracing::debug!(user_id = message.user_id, "welcome notification sent"),
            Err(e) => tracing::error!(
                user_id = message.user_id,
                error = %e,
                "failed to send welcome notification"
            ),
        }
    })
}

// 2. Webhook Implementation
/// WebhookNotifier
///
/// POSTs the message as JSON to a configured URL. Any non-2xx status is a failure.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_welcome(&self, message: &WelcomeMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "template": "user_welcome", "data": message }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

// 3. Log Implementation
/// LogNotifier
///
/// Writes the notification to the application log. Used when no webhook is configured.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, message: &WelcomeMessage) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %message.recipient,
            user_id = message.user_id,
            activation_token = %message.activation_token,
            "welcome notification (log delivery)"
        );
        Ok(())
    }
}

// 4. The Mock Implementation (For Unit Tests)
/// MockNotifier
///
/// Records every message it is asked to deliver so tests can assert on them.
#[derive(Default)]
pub struct MockNotifier {
    /// When true, every delivery returns a simulated failure.
    pub should_fail: bool,
    sent: Mutex<Vec<WelcomeMessage>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Messages delivered so far, oldest first.
    pub fn sent(&self) -> Vec<WelcomeMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_welcome(&self, message: &WelcomeMessage) -> Result<(), NotifyError> {
        if self.should_fail {
            return Err(NotifyError::Other("simulated delivery failure".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
