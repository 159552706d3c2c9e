use crate::store_mock::{FailingPublisher, FlakyStore, ManualClock};
use chrono::{DateTime, Duration, TimeZone, Utc};
use kalenteri::components::live::{LiveHub, Publisher};
use kalenteri::components::reminders::{ReminderDispatcher, ReminderKind, ReminderScheduler};
use kalenteri::components::store::models::{
    notification_kinds, Event, EventReminder, Todo, TodoReminder, TodoStatus,
};
use kalenteri::components::store::{InMemoryStore, Store};
use kalenteri::config::Config;
use kalenteri::error::Error;
use kalenteri::utils::scheduler::Scheduler;
use std::sync::Arc;

const USER: &str = "user-1";

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
}

fn event(id: &str, start: DateTime<Utc>, offsets: &[i64]) -> Event {
    Event {
        id: id.to_string(),
        user_id: USER.to_string(),
        calendar_id: "work".to_string(),
        title: format!("Meeting {}", id),
        start,
        end: start + Duration::minutes(30),
        reminders: offsets
            .iter()
            .map(|offset| EventReminder {
                offset_minutes: *offset,
                sent: false,
            })
            .collect(),
    }
}

fn todo(id: &str, due: DateTime<Utc>) -> Todo {
    Todo {
        id: id.to_string(),
        user_id: USER.to_string(),
        title: format!("Task {}", id),
        status: TodoStatus::Pending,
        due_date: Some(due),
        reminder: Some(TodoReminder {
            enabled: true,
            time: None,
            sent: false,
        }),
    }
}

fn dispatcher(store: Arc<dyn Store>, publisher: Arc<dyn Publisher>) -> ReminderDispatcher {
    ReminderDispatcher::new(store, publisher, &Config::default())
}

async fn notification_count(store: &dyn Store) -> usize {
    store.list_notifications(USER).await.unwrap().len()
}

#[tokio::test]
async fn test_event_reminder_fires_once_at_trigger() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(at(13, 44)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(notification_count(store.as_ref()).await, 0);

    let report = dispatcher.sweep(at(13, 45)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert!(report.failures.is_empty());

    let stored = store.get_event("standup").await.unwrap().unwrap();
    assert!(stored.reminders[0].sent);

    let notifications = store.list_notifications(USER).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, notification_kinds::EVENT_REMINDER);
    assert_eq!(notifications[0].event_id.as_deref(), Some("standup"));
    assert_eq!(notifications[0].created_at, at(13, 45));
    assert!(!notifications[0].read);
    assert!(notifications[0].message.contains("Meeting standup"));

    let report = dispatcher.sweep(at(13, 46)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(notification_count(store.as_ref()).await, 1);
}

#[tokio::test]
async fn test_each_event_reminder_fires_independently() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_event(&event("review", at(14, 0), &[60, 10]))
        .await
        .unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    assert_eq!(dispatcher.sweep(at(13, 30)).await.unwrap().sent(), 1);
    assert_eq!(dispatcher.sweep(at(13, 55)).await.unwrap().sent(), 1);
    assert_eq!(dispatcher.sweep(at(13, 59)).await.unwrap().sent(), 0);

    let stored = store.get_event("review").await.unwrap().unwrap();
    assert!(stored.reminders.iter().all(|reminder| reminder.sent));
    assert_eq!(notification_count(store.as_ref()).await, 2);
}

#[tokio::test]
async fn test_late_sweep_catches_up_missed_reminders() {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert_event(&event("planning", at(15, 0), &[120, 60, 30]))
        .await
        .unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    // Ticks were missed until well after every trigger
    let report = dispatcher.sweep(at(14, 50)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 3);

    let report = dispatcher.sweep(at(14, 51)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(notification_count(store.as_ref()).await, 3);
}

#[tokio::test]
async fn test_started_events_are_not_reminded() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("past", at(9, 0), &[15])).await.unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(at(9, 0)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(notification_count(store.as_ref()).await, 0);
}

#[tokio::test]
async fn test_todo_reminder_uses_due_date_lookahead() {
    let store = Arc::new(InMemoryStore::new());
    let now = at(12, 0);
    let due = now + Duration::minutes(90);
    store.insert_todo(&todo("report", due)).await.unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(now).await.unwrap();
    assert_eq!(report.todo_reminders_sent, 0);

    let report = dispatcher.sweep(due - Duration::minutes(45)).await.unwrap();
    assert_eq!(report.todo_reminders_sent, 1);

    let report = dispatcher.sweep(due - Duration::minutes(44)).await.unwrap();
    assert_eq!(report.todo_reminders_sent, 0);

    let notifications = store.list_notifications(USER).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, notification_kinds::TODO_REMINDER);
    assert_eq!(notifications[0].todo_id.as_deref(), Some("report"));

    let stored = store.get_todo("report").await.unwrap().unwrap();
    assert!(stored.reminder.unwrap().sent);
}

#[tokio::test]
async fn test_ineligible_todos_are_skipped() {
    let store = Arc::new(InMemoryStore::new());
    let now = at(12, 0);
    let due = now + Duration::minutes(30);

    let mut completed = todo("completed", due);
    completed.status = TodoStatus::Completed;
    let mut disabled = todo("disabled", due);
    disabled.reminder = Some(TodoReminder {
        enabled: false,
        time: None,
        sent: false,
    });
    let mut no_reminder = todo("no-reminder", due);
    no_reminder.reminder = None;
    let mut no_due_date = todo("no-due-date", due);
    no_due_date.due_date = None;
    let overdue = todo("overdue", now - Duration::minutes(1));
    let mut in_progress = todo("in-progress", due);
    in_progress.status = TodoStatus::InProgress;

    for item in [completed, disabled, no_reminder, no_due_date, overdue, in_progress] {
        store.insert_todo(&item).await.unwrap();
    }
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(now).await.unwrap();
    assert_eq!(report.todo_reminders_sent, 1);

    let notifications = store.list_notifications(USER).await.unwrap();
    assert_eq!(notifications[0].todo_id.as_deref(), Some("in-progress"));
}

#[tokio::test]
async fn test_failing_item_does_not_abort_sweep() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(&event("broken", at(14, 0), &[15])).await.unwrap();
    store.insert_event(&event("healthy", at(14, 5), &[15])).await.unwrap();
    store
        .insert_todo(&todo("chore", at(14, 30)))
        .await
        .unwrap();
    store.fail_notifications_for("broken");
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(at(13, 55)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert_eq!(report.todo_reminders_sent, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, ReminderKind::Event);
    assert_eq!(report.failures[0].item_id, "broken");

    let broken = store.get_event("broken").await.unwrap().unwrap();
    assert!(!broken.reminders[0].sent);

    // Still pending, so the next tick delivers it
    store.clear_failing_items();
    let report = dispatcher.sweep(at(13, 56)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert!(report.failures.is_empty());
    assert_eq!(notification_count(store.as_ref()).await, 3);
}

#[tokio::test]
async fn test_unreachable_store_skips_sweep_until_recovery() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    store.set_fail_queries(true);
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let result = dispatcher.sweep(at(13, 45)).await;
    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(notification_count(store.as_ref()).await, 0);

    store.set_fail_queries(false);
    let report = dispatcher.sweep(at(13, 46)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert_eq!(notification_count(store.as_ref()).await, 1);
}

#[tokio::test]
async fn test_failed_mark_sent_redelivers_next_tick() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    store.set_fail_mark_sent(true);
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(at(13, 45)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(notification_count(store.as_ref()).await, 1);

    store.set_fail_mark_sent(false);
    let report = dispatcher.sweep(at(13, 46)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);

    // The accepted duplicate
    assert_eq!(notification_count(store.as_ref()).await, 2);
    let report = dispatcher.sweep(at(13, 47)).await.unwrap();
    assert_eq!(report.sent(), 0);
    assert_eq!(notification_count(store.as_ref()).await, 2);
}

#[tokio::test]
async fn test_publish_failure_still_marks_sent() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::new(FailingPublisher));

    let report = dispatcher.sweep(at(13, 45)).await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert!(report.failures.is_empty());

    let stored = store.get_event("standup").await.unwrap().unwrap();
    assert!(stored.reminders[0].sent);
    assert_eq!(notification_count(store.as_ref()).await, 1);
}

#[tokio::test]
async fn test_live_subscriber_receives_reminder() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    store.insert_todo(&todo("chore", at(14, 30))).await.unwrap();
    let hub = Arc::new(LiveHub::new());
    let mut receiver = hub.subscribe(USER).await;
    let mut other_user = hub.subscribe("user-2").await;
    let dispatcher = dispatcher(store.clone(), hub.clone());

    dispatcher.sweep(at(13, 45)).await.unwrap();

    let first = receiver.recv().await.unwrap();
    assert_eq!(first.kind, "reminder");
    assert_eq!(first.notification.user_id, USER);
    assert_eq!(first.event.as_ref().map(|e| e.id.as_str()), Some("standup"));
    assert!(first.todo.is_none());

    let second = receiver.recv().await.unwrap();
    assert_eq!(second.todo.as_ref().map(|t| t.id.as_str()), Some("chore"));
    assert!(second.event.is_none());

    let json = serde_json::to_value(&first).unwrap();
    assert_eq!(json["type"], "reminder");
    assert_eq!(json["event"]["title"], "Meeting standup");

    assert!(other_user.try_recv().is_err());
}

#[tokio::test]
async fn test_sweep_is_skipped_while_another_dispatcher_holds_lease() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    assert!(store
        .try_acquire_sweep_lease("other-process", std::time::Duration::from_secs(60))
        .await
        .unwrap());
    let dispatcher = dispatcher(store.clone(), Arc::new(LiveHub::new()));

    let report = dispatcher.sweep(at(13, 45)).await.unwrap();
    assert!(report.skipped);
    assert_eq!(notification_count(store.as_ref()).await, 0);

    store.release_sweep_lease("other-process").await.unwrap();
    let report = dispatcher.sweep(at(13, 46)).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(report.event_reminders_sent, 1);
}

#[tokio::test]
async fn test_concurrent_dispatchers_deliver_at_most_once() {
    let store = Arc::new(InMemoryStore::new());
    for index in 0..5 {
        store
            .insert_event(&event(&format!("e{}", index), at(14, index), &[15, 5]))
            .await
            .unwrap();
    }
    let first = Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new())));
    let second = Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new())));

    for minute in [50, 51, 52, 53, 54, 55, 56, 57, 58, 59] {
        let now = at(13, minute);
        let (a, b) = tokio::join!(first.sweep(now), second.sweep(now));
        a.unwrap();
        b.unwrap();
    }

    // Five events with two reminders each
    assert_eq!(notification_count(store.as_ref()).await, 10);
    let pending = store.events_with_pending_reminders(at(13, 59)).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_scheduler_tick_now_uses_clock() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    let clock = Arc::new(ManualClock::new(at(13, 0)));
    let scheduler = ReminderScheduler::new(
        Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new()))),
        clock.clone(),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(5),
    );

    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.now, at(13, 0));
    assert_eq!(report.sent(), 0);

    clock.set(at(13, 45));
    let report = scheduler.tick_now().await.unwrap();
    assert_eq!(report.event_reminders_sent, 1);
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_scheduler_start_and_stop() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    let clock = Arc::new(ManualClock::new(at(13, 50)));
    let scheduler = ReminderScheduler::new(
        Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new()))),
        clock,
        std::time::Duration::from_millis(10),
        std::time::Duration::from_secs(5),
    );

    scheduler.start().unwrap();
    assert!(scheduler.is_running());
    assert!(matches!(scheduler.start(), Err(Error::Component(_))));

    let mut delivered = false;
    for _ in 0..100 {
        if notification_count(store.as_ref()).await == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(delivered, "timer never swept");

    scheduler.stop().await.unwrap();
    assert!(!scheduler.is_running());
    // Stopping twice is harmless
    scheduler.stop().await.unwrap();

    // Later ticks never duplicated the reminder
    assert_eq!(notification_count(store.as_ref()).await, 1);
}

#[tokio::test]
async fn test_stuck_sweep_times_out() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    store.set_query_delay(Some(std::time::Duration::from_millis(500)));
    let clock = Arc::new(ManualClock::new(at(13, 45)));
    let scheduler = ReminderScheduler::new(
        Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new()))),
        clock,
        std::time::Duration::from_secs(60),
        std::time::Duration::from_millis(50),
    );

    let result = scheduler.tick_now().await;
    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(notification_count(store.as_ref()).await, 0);
}

#[tokio::test]
async fn test_out_of_range_offset_is_a_failure_not_a_crash() {
    let store = Arc::new(InMemoryStore::new());
    // Stored directly, as a record written before offsets were bounded would be
    store
        .insert_event(&event("corrupt", at(14, 0), &[i64::MAX, 15]))
        .await
        .unwrap();
    store.insert_event(&event("healthy", at(14, 5), &[15])).await.unwrap();
    let dispatcher = Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new())));

    let sweeping = dispatcher.clone();
    let report = tokio::spawn(async move { sweeping.sweep(at(13, 55)).await })
        .await
        .expect("sweep panicked")
        .unwrap();

    assert_eq!(report.event_reminders_sent, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, ReminderKind::Event);
    assert_eq!(report.failures[0].item_id, "corrupt");

    let corrupt = store.get_event("corrupt").await.unwrap().unwrap();
    assert!(!corrupt.reminders[0].sent);
    assert!(corrupt.reminders[1].sent);
    assert!(store.get_event("healthy").await.unwrap().unwrap().reminders[0].sent);
}

#[tokio::test]
async fn test_timed_out_sweep_does_not_block_next_tick() {
    let store = Arc::new(FlakyStore::new());
    store.insert_event(&event("standup", at(14, 0), &[15])).await.unwrap();
    store.set_strict_lease(true);
    store.set_query_delay(Some(std::time::Duration::from_millis(500)));
    let clock = Arc::new(ManualClock::new(at(13, 45)));
    let scheduler = ReminderScheduler::new(
        Arc::new(dispatcher(store.clone(), Arc::new(LiveHub::new()))),
        clock,
        std::time::Duration::from_secs(60),
        std::time::Duration::from_millis(50),
    );

    let error = scheduler.tick_now().await.unwrap_err();
    assert!(matches!(error, Error::Store(_)));
    assert!(error.is_transient());
    assert!(store.lease_holder().is_none());

    store.set_query_delay(None);
    let report = scheduler.tick_now().await.unwrap();
    assert!(!report.skipped);
    assert_eq!(report.event_reminders_sent, 1);
    assert!(store.lease_holder().is_none());
}
