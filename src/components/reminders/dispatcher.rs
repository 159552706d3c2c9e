use super::notifications::{event_reminder_message, todo_reminder_message};
use crate::components::live::{LiveMessage, Publisher};
use crate::components::store::models::{notification_kinds, Event, Notification, Todo};
use crate::components::store::Store;
use crate::config::Config;
use crate::error::{invalid_input, AppResult};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Which kind of reminder an item was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Event,
    Todo,
}

/// A reminder that could not be delivered during a sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub kind: ReminderKind,
    pub item_id: String,
    pub error: String,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub now: DateTime<Utc>,
    /// Another dispatcher held the lease, nothing was scanned
    pub skipped: bool,
    pub event_reminders_sent: usize,
    pub todo_reminders_sent: usize,
    /// Reminders another dispatcher marked sent between our read and our write
    pub already_sent: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            skipped: false,
            event_reminders_sent: 0,
            todo_reminders_sent: 0,
            already_sent: 0,
            failures: Vec::new(),
        }
    }

    /// Total notifications created by this sweep
    pub fn sent(&self) -> usize {
        self.event_reminders_sent + self.todo_reminders_sent
    }

    fn record(&mut self, kind: ReminderKind, item_id: &str, result: AppResult<bool>) {
        match result {
            Ok(true) => match kind {
                ReminderKind::Event => self.event_reminders_sent += 1,
                ReminderKind::Todo => self.todo_reminders_sent += 1,
            },
            Ok(false) => self.already_sent += 1,
            Err(e) => {
                error!("Failed to dispatch {:?} reminder for {}: {}", kind, item_id, e);
                self.failures.push(SweepFailure {
                    kind,
                    item_id: item_id.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Scans due reminders and turns each into exactly one notification
pub struct ReminderDispatcher {
    store: Arc<dyn Store>,
    publisher: Arc<dyn Publisher>,
    tz: Tz,
    todo_lookahead: Duration,
    lease_owner: String,
    lease_ttl: std::time::Duration,
}

impl ReminderDispatcher {
    /// Create a dispatcher with settings from `config`
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn Publisher>, config: &Config) -> Self {
        Self {
            store,
            publisher,
            tz: config.tz(),
            todo_lookahead: Duration::minutes(config.todo_reminder_lookahead_minutes),
            lease_owner: uuid::Uuid::new_v4().to_string(),
            // Outlives a sweep that hits the timeout, so a stuck sweep cannot overlap the next
            lease_ttl: std::time::Duration::from_secs(config.reminder_sweep_timeout_secs * 2),
        }
    }

    /// Run one sweep as of `now`.
    ///
    /// Fails only when the store cannot be queried; failures of single
    /// reminders are collected in the report instead.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let mut report = SweepReport::new(now);

        if !self
            .store
            .try_acquire_sweep_lease(&self.lease_owner, self.lease_ttl)
            .await?
        {
            debug!("Another dispatcher holds the sweep lease, skipping");
            report.skipped = true;
            return Ok(report);
        }

        let result = self.sweep_locked(now, &mut report).await;
        self.release_lease().await;
        result?;

        if report.sent() > 0 || !report.failures.is_empty() {
            info!(
                "Reminder sweep sent {} event and {} todo reminders ({} failed)",
                report.event_reminders_sent,
                report.todo_reminders_sent,
                report.failures.len()
            );
        } else {
            debug!("Reminder sweep found nothing due");
        }

        Ok(report)
    }

    /// Give up the sweep lease if this dispatcher holds it
    pub async fn release_lease(&self) {
        if let Err(e) = self.store.release_sweep_lease(&self.lease_owner).await {
            warn!("Failed to release sweep lease: {}", e);
        }
    }

    async fn sweep_locked(&self, now: DateTime<Utc>, report: &mut SweepReport) -> AppResult<()> {
        let events = self.store.events_with_pending_reminders(now).await?;
        for event in &events {
            for (index, reminder) in event.reminders.iter().enumerate() {
                if reminder.sent {
                    continue;
                }
                match event.reminder_trigger(index) {
                    Some(trigger) if trigger <= now => {}
                    Some(_) => continue,
                    None => {
                        let error = invalid_input(&format!(
                            "Reminder offset {} of event {} is out of range",
                            reminder.offset_minutes, event.id
                        ));
                        report.record(ReminderKind::Event, &event.id, Err(error));
                        continue;
                    }
                }

                let result = self.fire_event_reminder(event, index, now).await;
                report.record(ReminderKind::Event, &event.id, result);
            }
        }

        let todos = self
            .store
            .todos_due_for_reminder(now, now + self.todo_lookahead)
            .await?;
        for todo in &todos {
            let result = self.fire_todo_reminder(todo, now).await;
            report.record(ReminderKind::Todo, &todo.id, result);
        }

        Ok(())
    }

    /// Create, publish, then mark sent. Returns whether this call flipped the flag.
    async fn fire_event_reminder(
        &self,
        event: &Event,
        index: usize,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let reminder = &event.reminders[index];
        let notification = Notification::new(
            &event.user_id,
            notification_kinds::EVENT_REMINDER,
            event_reminder_message(event, reminder, self.tz),
        )
        .with_event(&event.id)
        .created_at(now);

        self.store.create_notification(&notification).await?;
        self.publish(&event.user_id, LiveMessage::event_reminder(notification, event))
            .await;

        // If this write fails the reminder stays pending and is delivered again next tick
        let flipped = self.store.mark_event_reminder_sent(&event.id, index).await?;
        if !flipped {
            warn!(
                "Reminder {} of event {} was already marked sent by another dispatcher",
                index, event.id
            );
        }
        Ok(flipped)
    }

    async fn fire_todo_reminder(&self, todo: &Todo, now: DateTime<Utc>) -> AppResult<bool> {
        let notification = Notification::new(
            &todo.user_id,
            notification_kinds::TODO_REMINDER,
            todo_reminder_message(todo, self.tz),
        )
        .with_todo(&todo.id)
        .created_at(now);

        self.store.create_notification(&notification).await?;
        self.publish(&todo.user_id, LiveMessage::todo_reminder(notification, todo))
            .await;

        let flipped = self.store.mark_todo_reminder_sent(&todo.id).await?;
        if !flipped {
            warn!(
                "Reminder of todo {} was already marked sent by another dispatcher",
                todo.id
            );
        }
        Ok(flipped)
    }

    /// The notification is already stored, so a failed push is only logged
    async fn publish(&self, user_id: &str, message: LiveMessage) {
        match self.publisher.publish(user_id, message).await {
            Ok(receivers) => debug!("Published reminder to {} live subscribers of {}", receivers, user_id),
            Err(e) => warn!("Failed to publish reminder to {}: {}", user_id, e),
        }
    }
}
