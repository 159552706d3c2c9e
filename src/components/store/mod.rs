mod memory;
pub mod models;
mod redis_store;

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;

use crate::config::Config;
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use models::{Event, Notification, Todo, TodoStatus, WorkingHours};
use std::sync::Arc;
use tracing::{error, info};

/// Persistence capabilities consumed by the finder, the dispatcher and the API
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Store a new event (or replace one with the same id)
    async fn insert_event(&self, event: &Event) -> AppResult<()>;

    /// Get a single event
    async fn get_event(&self, event_id: &str) -> AppResult<Option<Event>>;

    /// Delete an event, returning whether it existed
    async fn delete_event(&self, event_id: &str) -> AppResult<bool>;

    /// Delete every event of a calendar, returning how many were removed
    async fn delete_calendar_events(&self, calendar_id: &str) -> AppResult<usize>;

    /// Events of `user_id` with `start < to && end > from`
    async fn events_overlapping(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>>;

    /// Events with `start > now` that still have an unsent reminder
    async fn events_with_pending_reminders(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>>;

    /// Atomically flip the reminder at `index` to sent.
    ///
    /// Returns `false` when it was already sent.
    async fn mark_event_reminder_sent(&self, event_id: &str, index: usize) -> AppResult<bool>;

    /// Store a new todo (or replace one with the same id)
    async fn insert_todo(&self, todo: &Todo) -> AppResult<()>;

    /// Get a single todo
    async fn get_todo(&self, todo_id: &str) -> AppResult<Option<Todo>>;

    /// Change a todo's status
    async fn set_todo_status(&self, todo_id: &str, status: TodoStatus) -> AppResult<()>;

    /// Todos not completed, due in `[now, until]`, with an enabled unsent reminder
    async fn todos_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Todo>>;

    /// Atomically flip a todo's reminder to sent.
    ///
    /// Returns `false` when it was already sent.
    async fn mark_todo_reminder_sent(&self, todo_id: &str) -> AppResult<bool>;

    /// Get a user's working hours, if configured
    async fn get_working_hours(&self, user_id: &str) -> AppResult<Option<WorkingHours>>;

    /// Set a user's working hours
    async fn set_working_hours(&self, user_id: &str, hours: &WorkingHours) -> AppResult<()>;

    /// Persist a notification; it expires after the retention window
    async fn create_notification(&self, notification: &Notification) -> AppResult<()>;

    /// A user's unexpired notifications, newest first
    async fn list_notifications(&self, user_id: &str) -> AppResult<Vec<Notification>>;

    /// Mark a notification read, returning whether it exists
    async fn mark_notification_read(&self, notification_id: &str) -> AppResult<bool>;

    /// Try to become the only dispatcher sweeping for `ttl`
    async fn try_acquire_sweep_lease(&self, owner: &str, ttl: std::time::Duration)
        -> AppResult<bool>;

    /// Give up the lease if `owner` still holds it
    async fn release_sweep_lease(&self, owner: &str) -> AppResult<()>;
}

/// Notification retention from the config
pub fn retention(config: &Config) -> Duration {
    Duration::days(config.notification_retention_days)
}

/// Open the configured store, falling back to memory when Redis is unavailable
pub async fn connect(config: &Config) -> Arc<dyn Store> {
    let retention = retention(config);

    match &config.redis_url {
        Some(redis_url) => match RedisStore::connect(redis_url, retention).await {
            Ok(store) => {
                info!("Connected to Redis successfully");
                Arc::new(store)
            }
            Err(e) => {
                // Log the error and fall back to an in-memory store
                error!("Failed to connect to Redis: {}", e);
                info!("Using in-memory store as fallback");
                Arc::new(InMemoryStore::with_retention(retention))
            }
        },
        None => {
            info!("REDIS_URL not set, using in-memory store");
            Arc::new(InMemoryStore::with_retention(retention))
        }
    }
}
