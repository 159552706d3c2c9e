use super::models::{Event, Notification, Todo, TodoStatus, WorkingHours};
use super::Store;
use crate::error::{not_found, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

/// A notification together with the instant it stops being visible
#[derive(Debug, Clone)]
struct StoredNotification {
    notification: Notification,
    expires_at: Instant,
}

/// In-memory implementation of the store (for testing and as a fallback)
#[derive(Debug)]
pub struct InMemoryStore {
    events: RwLock<HashMap<String, Event>>,
    todos: RwLock<HashMap<String, Todo>>,
    working_hours: RwLock<HashMap<String, WorkingHours>>,
    notifications: RwLock<HashMap<String, StoredNotification>>,
    lease: Mutex<Option<(String, Instant)>>,
    retention: std::time::Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_retention(Duration::days(30))
    }
}

impl InMemoryStore {
    /// Create an empty store with the default 30 day notification retention
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose notifications expire after `retention`
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            todos: RwLock::new(HashMap::new()),
            working_hours: RwLock::new(HashMap::new()),
            notifications: RwLock::new(HashMap::new()),
            lease: Mutex::new(None),
            retention: retention.to_std().unwrap_or_default(),
        }
    }

    /// Drop notifications whose retention window has passed
    async fn prune_notifications(&self) {
        let now = Instant::now();
        let mut notifications = self.notifications.write().await;
        notifications.retain(|_, stored| stored.expires_at > now);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_event(&self, event: &Event) -> AppResult<()> {
        let mut events = self.events.write().await;
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> AppResult<Option<Event>> {
        let events = self.events.read().await;
        Ok(events.get(event_id).cloned())
    }

    async fn delete_event(&self, event_id: &str) -> AppResult<bool> {
        let mut events = self.events.write().await;
        Ok(events.remove(event_id).is_some())
    }

    async fn delete_calendar_events(&self, calendar_id: &str) -> AppResult<usize> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|_, event| event.calendar_id != calendar_id);
        Ok(before - events.len())
    }

    async fn events_overlapping(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        let events = self.events.read().await;
        Ok(events
            .values()
            .filter(|event| event.user_id == user_id && event.overlaps(from, to))
            .cloned()
            .collect())
    }

    async fn events_with_pending_reminders(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let events = self.events.read().await;
        let mut pending: Vec<Event> = events
            .values()
            .filter(|event| event.start > now && event.has_pending_reminders())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn mark_event_reminder_sent(&self, event_id: &str, index: usize) -> AppResult<bool> {
        let mut events = self.events.write().await;
        let reminder = events
            .get_mut(event_id)
            .and_then(|event| event.reminders.get_mut(index))
            .ok_or_else(|| not_found(&format!("Reminder {} of event {}", index, event_id)))?;

        if reminder.sent {
            return Ok(false);
        }
        reminder.sent = true;
        Ok(true)
    }

    async fn insert_todo(&self, todo: &Todo) -> AppResult<()> {
        let mut todos = self.todos.write().await;
        todos.insert(todo.id.clone(), todo.clone());
        Ok(())
    }

    async fn get_todo(&self, todo_id: &str) -> AppResult<Option<Todo>> {
        let todos = self.todos.read().await;
        Ok(todos.get(todo_id).cloned())
    }

    async fn set_todo_status(&self, todo_id: &str, status: TodoStatus) -> AppResult<()> {
        let mut todos = self.todos.write().await;
        let todo = todos
            .get_mut(todo_id)
            .ok_or_else(|| not_found(&format!("Todo {}", todo_id)))?;
        todo.status = status;
        Ok(())
    }

    async fn todos_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Todo>> {
        let todos = self.todos.read().await;
        let mut due: Vec<Todo> = todos
            .values()
            .filter(|todo| todo.reminder_due(now, until))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.due_date.cmp(&b.due_date).then_with(|| a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn mark_todo_reminder_sent(&self, todo_id: &str) -> AppResult<bool> {
        let mut todos = self.todos.write().await;
        let reminder = todos
            .get_mut(todo_id)
            .and_then(|todo| todo.reminder.as_mut())
            .ok_or_else(|| not_found(&format!("Reminder of todo {}", todo_id)))?;

        if reminder.sent {
            return Ok(false);
        }
        reminder.sent = true;
        Ok(true)
    }

    async fn get_working_hours(&self, user_id: &str) -> AppResult<Option<WorkingHours>> {
        let working_hours = self.working_hours.read().await;
        Ok(working_hours.get(user_id).cloned())
    }

    async fn set_working_hours(&self, user_id: &str, hours: &WorkingHours) -> AppResult<()> {
        let mut working_hours = self.working_hours.write().await;
        working_hours.insert(user_id.to_string(), hours.clone());
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> AppResult<()> {
        let mut notifications = self.notifications.write().await;
        notifications.insert(
            notification.id.clone(),
            StoredNotification {
                notification: notification.clone(),
                expires_at: Instant::now() + self.retention,
            },
        );
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        self.prune_notifications().await;

        let notifications = self.notifications.read().await;
        let mut listed: Vec<Notification> = notifications
            .values()
            .filter(|stored| stored.notification.user_id == user_id)
            .map(|stored| stored.notification.clone())
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(listed)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> AppResult<bool> {
        self.prune_notifications().await;

        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(notification_id) {
            Some(stored) => {
                stored.notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_acquire_sweep_lease(
        &self,
        owner: &str,
        ttl: std::time::Duration,
    ) -> AppResult<bool> {
        let now = Instant::now();
        let mut lease = self.lease.lock().await;

        match lease.as_ref() {
            Some((holder, expires_at)) if holder != owner && *expires_at > now => Ok(false),
            _ => {
                *lease = Some((owner.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release_sweep_lease(&self, owner: &str) -> AppResult<()> {
        let mut lease = self.lease.lock().await;
        if matches!(lease.as_ref(), Some((holder, _)) if holder == owner) {
            *lease = None;
        }
        Ok(())
    }
}
