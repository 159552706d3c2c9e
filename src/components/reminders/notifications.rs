use crate::components::store::models::{Event, EventReminder, Todo};
use chrono_tz::Tz;

/// Text of an event reminder notification
pub fn event_reminder_message(event: &Event, reminder: &EventReminder, tz: Tz) -> String {
    let start = event.start.with_timezone(&tz);
    let lead = match reminder.offset_minutes {
        1 => "in 1 minute".to_string(),
        minutes if minutes % 60 == 0 && minutes >= 60 => match minutes / 60 {
            1 => "in 1 hour".to_string(),
            hours => format!("in {} hours", hours),
        },
        minutes => format!("in {} minutes", minutes),
    };

    format!(
        "Reminder: {} starts {} ({})",
        event.title,
        lead,
        start.format("%d.%m. %H:%M")
    )
}

/// Text of a todo reminder notification
pub fn todo_reminder_message(todo: &Todo, tz: Tz) -> String {
    match todo.due_date {
        Some(due) => format!(
            "Todo due soon: {} (due {})",
            todo.title,
            due.with_timezone(&tz).format("%d.%m. %H:%M")
        ),
        None => format!("Todo due soon: {}", todo.title),
    }
}
