use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Largest accepted reminder offset: one leap year
pub const MAX_REMINDER_OFFSET_MINUTES: i64 = 366 * 24 * 60;

/// A reminder attached to an event, fired `offset_minutes` before its start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReminder {
    pub offset_minutes: i64,
    #[serde(default)]
    pub sent: bool,
}

/// A scheduled calendar event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub reminders: Vec<EventReminder>,
}

impl Event {
    /// Whether the event's `[start, end)` intersects `[from, to)`
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }

    /// Instant at which the reminder at `index` becomes due.
    ///
    /// `None` for a missing index or an offset too large to subtract.
    pub fn reminder_trigger(&self, index: usize) -> Option<DateTime<Utc>> {
        let reminder = self.reminders.get(index)?;
        let offset = Duration::try_minutes(reminder.offset_minutes)?;
        self.start.checked_sub_signed(offset)
    }

    /// Whether any reminder is still pending
    pub fn has_pending_reminders(&self) -> bool {
        self.reminders.iter().any(|reminder| !reminder.sent)
    }
}

/// Todo lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// The single reminder a todo may carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoReminder {
    pub enabled: bool,
    /// Requested reminder time. Dispatch uses the due-date lookahead instead.
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent: bool,
}

/// A todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub status: TodoStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder: Option<TodoReminder>,
}

impl Todo {
    /// Whether the todo's reminder should fire for a due date in `[now, until]`
    pub fn reminder_due(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        let Some(due) = self.due_date else {
            return false;
        };
        let armed = self
            .reminder
            .as_ref()
            .map(|reminder| reminder.enabled && !reminder.sent)
            .unwrap_or(false);

        armed && self.status != TodoStatus::Completed && due >= now && due <= until
    }
}

/// A user's working window, as "HH:MM" wall-clock strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
        }
    }
}

/// An open interval in a user's day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Notification type tags
pub mod notification_kinds {
    pub const EVENT_REMINDER: &str = "event_reminder";
    pub const TODO_REMINDER: &str = "todo_reminder";
}

/// A message shown to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub event_id: Option<String>,
    pub todo_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new unread notification with a fresh id
    pub fn new(user_id: impl Into<String>, kind: &str, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: kind.to_string(),
            message: message.into(),
            read: false,
            event_id: None,
            todo_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_todo(mut self, todo_id: impl Into<String>) -> Self {
        self.todo_id = Some(todo_id.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}
