//! Fire-and-forget notification units.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::info;

use super::{UnitContext, UnitOfWork};
use crate::error::Failure;

/// A published message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub message: Value,
}

/// Destination for notifications. Publishing returns no structured response.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), Failure>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, notification: Notification) -> Result<(), Failure> {
        info!(
            topic = notification.topic.as_deref().unwrap_or("-"),
            message = %notification.message,
            "Notification published"
        );
        Ok(())
    }
}

/// Forwards notifications to an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn publish(&self, notification: Notification) -> Result<(), Failure> {
        self.sender
            .send(notification)
            .map_err(|_| Failure::task_failed("notification channel closed"))
    }
}

/// Publishes its input to a [`NotificationSink`].
///
/// An object input with a `message` field is published as
/// `{topic?, message}`; any other input is the message itself. The unit's
/// output is `{"published": true, "topic": ...}`.
pub struct NotifyUnit {
    name: String,
    default_topic: Option<String>,
    sink: Arc<dyn NotificationSink>,
}

impl NotifyUnit {
    pub fn new(name: impl Into<String>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            name: name.into(),
            default_topic: None,
            sink,
        }
    }

    /// Topic used when the input names none.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.default_topic = Some(topic.into());
        self
    }

    fn notification(&self, input: Value) -> Notification {
        match input {
            Value::Object(mut fields) if fields.contains_key("message") => {
                let topic = match fields.remove("topic") {
                    Some(Value::String(topic)) => Some(topic),
                    _ => self.default_topic.clone(),
                };
                Notification {
                    topic,
                    message: fields.remove("message").unwrap_or(Value::Null),
                }
            }
            message => Notification {
                topic: self.default_topic.clone(),
                message,
            },
        }
    }
}

#[async_trait]
impl UnitOfWork for NotifyUnit {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: Value, _ctx: &UnitContext) -> Result<Value, Failure> {
        let notification = self.notification(input);
        let topic = notification.topic.clone();
        self.sink.publish(notification).await?;
        Ok(json!({"published": true, "topic": topic}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_over_channel() {
        let (sink, mut receiver) = ChannelSink::new();
        let unit = NotifyUnit::new("notify", Arc::new(sink));

        let out = unit
            .invoke(
                json!({"topic": "review", "message": {"documentId": "d1"}}),
                &UnitContext::detached("Notify"),
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"published": true, "topic": "review"}));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.topic.as_deref(), Some("review"));
        assert_eq!(received.message, json!({"documentId": "d1"}));
    }

    #[tokio::test]
    async fn test_notify_plain_input_uses_default_topic() {
        let (sink, mut receiver) = ChannelSink::new();
        let unit = NotifyUnit::new("notify", Arc::new(sink)).with_topic("ops");

        unit.invoke(json!("disk almost full"), &UnitContext::detached("N"))
            .await
            .unwrap();
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.topic.as_deref(), Some("ops"));
        assert_eq!(received.message, json!("disk almost full"));
    }

    #[tokio::test]
    async fn test_closed_channel_is_task_failure() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        let unit = NotifyUnit::new("notify", Arc::new(sink));
        let err = unit
            .invoke(json!({"message": 1}), &UnitContext::detached("N"))
            .await
            .unwrap_err();
        assert_eq!(err, Failure::task_failed("notification channel closed"));
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts() {
        let unit = NotifyUnit::new("log", Arc::new(TracingSink));
        let out = unit
            .invoke(json!({"message": "hi"}), &UnitContext::detached("N"))
            .await
            .unwrap();
        assert_eq!(out["published"], json!(true));
    }
}
