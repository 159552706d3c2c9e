use crate::components::store::models::{Event, Notification, Todo};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Messages buffered per user before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 64;

/// Short form of the event a live message refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start: event.start,
        }
    }
}

/// Short form of the todo a live message refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoSummary {
    pub id: String,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<&Todo> for TodoSummary {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id.clone(),
            title: todo.title.clone(),
            due_date: todo.due_date,
        }
    }
}

/// Payload pushed to a user's live channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todo: Option<TodoSummary>,
}

impl LiveMessage {
    /// A reminder about an event
    pub fn event_reminder(notification: Notification, event: &Event) -> Self {
        Self {
            kind: "reminder".to_string(),
            notification,
            event: Some(event.into()),
            todo: None,
        }
    }

    /// A reminder about a todo
    pub fn todo_reminder(notification: Notification, todo: &Todo) -> Self {
        Self {
            kind: "reminder".to_string(),
            notification,
            event: None,
            todo: Some(todo.into()),
        }
    }
}

/// Delivers a message to every connection subscribed under a user
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Publish to `user_id`, returning how many subscribers received it
    async fn publish(&self, user_id: &str, message: LiveMessage) -> AppResult<usize>;
}

/// In-process fan-out of live messages, one broadcast channel per user
#[derive(Debug, Default)]
pub struct LiveHub {
    channels: RwLock<HashMap<String, broadcast::Sender<LiveMessage>>>,
}

impl LiveHub {
    /// Create a hub with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a user's live messages.
    ///
    /// Channels of other users whose subscribers have all disconnected are
    /// dropped here, so users that never receive a message do not pile up.
    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<LiveMessage> {
        let mut channels = self.channels.write().await;
        channels.retain(|user, sender| user == user_id || sender.receiver_count() > 0);
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live subscribers for a user
    pub async fn subscriber_count(&self, user_id: &str) -> usize {
        let channels = self.channels.read().await;
        channels
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of users with an open channel
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[async_trait]
impl Publisher for LiveHub {
    async fn publish(&self, user_id: &str, message: LiveMessage) -> AppResult<usize> {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(user_id).cloned()
        };

        let Some(sender) = sender else {
            debug!("No live subscribers for {}", user_id);
            return Ok(0);
        };

        match sender.send(message) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                // Every receiver is gone; forget the channel
                let mut channels = self.channels.write().await;
                if channels
                    .get(user_id)
                    .is_some_and(|sender| sender.receiver_count() == 0)
                {
                    channels.remove(user_id);
                }
                Ok(0)
            }
        }
    }
}
