//! Storage-write event delivery.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{StorageError, format_error_chain_ref};
use crate::events::StorageEvent;

/// Where storage-write events are delivered
enum EventSink {
    /// In-process worker queue
    Channel(mpsc::Sender<StorageEvent>),
    /// Remote worker, receives the notification JSON
    Webhook { client: reqwest::Client, url: String },
}

/// Fans storage-write events out to every configured sink.
///
/// Delivery failures are logged and never fail the write that caused them.
#[derive(Default)]
pub struct EventPublisher {
    sinks: Vec<EventSink>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, sender: mpsc::Sender<StorageEvent>) -> Self {
        self.sinks.push(EventSink::Channel(sender));
        self
    }

    pub fn with_webhook(mut self, url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build webhook client with timeout, using defaults");
                reqwest::Client::new()
            });
        self.sinks.push(EventSink::Webhook {
            client,
            url: url.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn publish(&self, event: &StorageEvent) {
        for sink in &self.sinks {
            let result = match sink {
                EventSink::Channel(sender) => {
                    sender
                        .send(event.clone())
                        .await
                        .map_err(|_| StorageError::Notification {
                            target: "worker queue".to_string(),
                            message: "worker queue is closed".to_string(),
                        })
                }
                EventSink::Webhook { client, url } => {
                    deliver_webhook(client, url, event).await
                }
            };

            match result {
                Ok(()) => debug!(object = %event.object, "Storage event published"),
                Err(e) => warn!(
                    object = %event.object,
                    error = %format_error_chain_ref(&e),
                    "Storage event delivery failed"
                ),
            }
        }
    }
}

async fn deliver_webhook(
    client: &reqwest::Client,
    url: &str,
    event: &StorageEvent,
) -> Result<(), StorageError> {
    let response = client
        .post(url)
        .json(&event.to_notification())
        .send()
        .await
        .map_err(|e| StorageError::Notification {
            target: url.to_string(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(StorageError::Notification {
            target: url.to_string(),
            message: format!("webhook answered with status {}", response.status()),
        });
    }

    Ok(())
}
