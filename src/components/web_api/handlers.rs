use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::components::store::models::{
    Event, EventReminder, FreeSlot, Notification, Todo, TodoReminder, TodoStatus, WorkingHours,
    MAX_REMINDER_OFFSET_MINUTES,
};
use crate::error::{invalid_input, not_found, AppResult};
use crate::utils::time::{parse_date, parse_time};

/// Query parameters of the free-slot request
#[derive(Debug, Deserialize)]
pub struct FreeSlotsQuery {
    pub date: Option<String>,
    pub duration: Option<String>,
}

/// Body of an event creation request
#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub reminders: Vec<NewEventReminder>,
}

#[derive(Debug, Deserialize)]
pub struct NewEventReminder {
    pub offset_minutes: i64,
}

/// Body of a todo creation request
#[derive(Debug, Deserialize)]
pub struct NewTodo {
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder: Option<NewTodoReminder>,
}

#[derive(Debug, Deserialize)]
pub struct NewTodoReminder {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub time: Option<DateTime<Utc>>,
}

fn enabled_by_default() -> bool {
    true
}

/// Handler for health checks
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Handler for the free-slot computation
pub async fn free_slots_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<FreeSlotsQuery>,
) -> AppResult<Json<Vec<FreeSlot>>> {
    let date = params
        .date
        .as_deref()
        .ok_or_else(|| invalid_input("Query parameter 'date' is required"))?;
    let date = parse_date(date)?;

    let duration = params
        .duration
        .as_deref()
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| invalid_input(&format!("Invalid duration '{}'", value)))
        })
        .transpose()?;

    let slots = state
        .finder
        .find_free_slots(&user_id, date, duration, None)
        .await?;
    Ok(Json(slots))
}

/// Handler returning a user's effective working hours
pub async fn get_working_hours_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<WorkingHours>> {
    let hours = state.finder.working_hours_for(&user_id, None).await?;
    Ok(Json(hours))
}

/// Handler storing a user's working hours
pub async fn put_working_hours_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(hours): Json<WorkingHours>,
) -> AppResult<Json<WorkingHours>> {
    let start = parse_time(&hours.start)
        .ok_or_else(|| invalid_input(&format!("Invalid start time '{}'", hours.start)))?;
    let end = parse_time(&hours.end)
        .ok_or_else(|| invalid_input(&format!("Invalid end time '{}'", hours.end)))?;
    if end <= start {
        return Err(invalid_input("Working hours end must be after start"));
    }

    state.store.set_working_hours(&user_id, &hours).await?;
    info!("Working hours of {} set to {}-{}", user_id, hours.start, hours.end);
    Ok(Json(hours))
}

/// Handler creating an event
pub async fn create_event_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(new_event): Json<NewEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    if new_event.title.trim().is_empty() {
        return Err(invalid_input("Event title must not be empty"));
    }
    if new_event.end <= new_event.start {
        return Err(invalid_input("Event end must be after its start"));
    }
    // Reminders fire only while the event has not started, so zero never fires
    if new_event
        .reminders
        .iter()
        .any(|r| !(1..=MAX_REMINDER_OFFSET_MINUTES).contains(&r.offset_minutes))
    {
        return Err(invalid_input(&format!(
            "Reminder offsets must be between 1 and {} minutes",
            MAX_REMINDER_OFFSET_MINUTES
        )));
    }

    let event = Event {
        id: Uuid::new_v4().to_string(),
        user_id,
        calendar_id: new_event.calendar_id,
        title: new_event.title,
        start: new_event.start,
        end: new_event.end,
        reminders: new_event
            .reminders
            .into_iter()
            .map(|r| EventReminder {
                offset_minutes: r.offset_minutes,
                sent: false,
            })
            .collect(),
    };

    state.store.insert_event(&event).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Handler deleting an event
pub async fn delete_event_handler(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.store.delete_event(&event_id).await? {
        return Err(not_found(&format!("Event {}", event_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler deleting all events of a calendar
pub async fn delete_calendar_events_handler(
    State(state): State<AppState>,
    Path(calendar_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let deleted = state.store.delete_calendar_events(&calendar_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// Handler creating a todo
pub async fn create_todo_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(new_todo): Json<NewTodo>,
) -> AppResult<(StatusCode, Json<Todo>)> {
    if new_todo.title.trim().is_empty() {
        return Err(invalid_input("Todo title must not be empty"));
    }

    let todo = Todo {
        id: Uuid::new_v4().to_string(),
        user_id,
        title: new_todo.title,
        status: TodoStatus::Pending,
        due_date: new_todo.due_date,
        reminder: new_todo.reminder.map(|r| TodoReminder {
            enabled: r.enabled,
            time: r.time,
            sent: false,
        }),
    };

    state.store.insert_todo(&todo).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// Handler completing a todo
pub async fn complete_todo_handler(
    State(state): State<AppState>,
    Path(todo_id): Path<String>,
) -> AppResult<Json<Todo>> {
    state
        .store
        .set_todo_status(&todo_id, TodoStatus::Completed)
        .await?;
    let todo = state
        .store
        .get_todo(&todo_id)
        .await?
        .ok_or_else(|| not_found(&format!("Todo {}", todo_id)))?;
    Ok(Json(todo))
}

/// Handler listing a user's notifications
pub async fn list_notifications_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<Notification>>> {
    let notifications = state.store.list_notifications(&user_id).await?;
    Ok(Json(notifications))
}

/// Handler acknowledging a notification
pub async fn mark_notification_read_handler(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.store.mark_notification_read(&notification_id).await? {
        return Err(not_found(&format!("Notification {}", notification_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Handler streaming a user's live messages as server-sent events
pub async fn live_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.live.subscribe(&user_id).await;
    info!("Live subscriber connected for {}", user_id);

    let stream = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => match SseEvent::default().event(&message.kind).json_data(&message) {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(e) => warn!("Failed to encode live message: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Live subscriber lagged, {} messages dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
