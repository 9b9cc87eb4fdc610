//! Outbound run notifications.
//!
//! [`WebhookNotifier`] posts Discord-style embeds. When no webhook is
//! configured the crawler uses [`NoopNotifier`] instead; a crawl never depends
//! on a notification being delivered.

use crate::error::NotifyError;
use crate::models::NotificationEvent;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    target: String,
    username: String,
    avatar_url: Option<String>,
}

impl WebhookNotifier {
    /// Create a notifier posting to a Discord-compatible webhook.
    ///
    /// # Arguments
    ///
    /// * `target` - Webhook URL
    /// * `username` - Display name of the posting bot
    /// * `avatar_url` - Optional avatar image for the bot
    pub fn new(
        target: impl Into<String>,
        username: impl Into<String>,
        avatar_url: Option<String>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            target: target.into(),
            username: username.into(),
            avatar_url,
        })
    }

    fn payload<'a>(&'a self, event: &'a NotificationEvent) -> WebhookPayload<'a> {
        WebhookPayload {
            username: &self.username,
            avatar_url: self.avatar_url.as_deref(),
            embeds: [Embed {
                title: &event.title,
                description: &event.description,
                color: event.severity.color(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(
        level = "debug",
        skip_all,
        fields(title = %event.title, severity = ?event.severity)
    )]
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload = self.payload(event);
        let request = match &event.attachment {
            None => self.client.post(&self.target).json(&payload),
            Some(attachment) => {
                let file = Part::text(attachment.content.clone())
                    .file_name(attachment.file_name.clone())
                    .mime_str("text/plain")?;
                let form = Form::new()
                    .text("payload_json", serde_json::to_string(&payload)?)
                    .part("files[0]", file);
                self.client.post(&self.target).multipart(form)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        debug!(status = status.as_u16(), "Notification delivered");
        Ok(())
    }
}

/// Stands in when no notification target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        debug!(title = %event.title, "No notification target configured; dropping notification");
        Ok(())
    }
}
