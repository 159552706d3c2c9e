use crate::components::store::models::{Event, FreeSlot, WorkingHours};
use crate::error::{invalid_input, AppResult};
use crate::utils::time::{at_time_of_day, minutes_between};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// The `[day_start, day_end)` window of `date` bounded by `hours` in `tz`
pub fn day_window(
    date: NaiveDate,
    hours: &WorkingHours,
    tz: Tz,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let day_start = at_time_of_day(date, &hours.start, tz)?;
    let day_end = at_time_of_day(date, &hours.end, tz)?;

    if day_end <= day_start {
        return Err(invalid_input(&format!(
            "Working hours end ({}) must be after start ({})",
            hours.end, hours.start
        )));
    }

    Ok((day_start, day_end))
}

/// Build a slot if the gap is long enough
fn slot_if_fits(start: DateTime<Utc>, end: DateTime<Utc>, min_minutes: i64) -> Option<FreeSlot> {
    let duration_minutes = minutes_between(start, end);
    (duration_minutes >= min_minutes).then_some(FreeSlot {
        start,
        end,
        duration_minutes,
    })
}

/// Gaps of at least `min_minutes` between `events` inside `[day_start, day_end)`.
///
/// Events outside the window are ignored and the rest are clamped to it.
/// Overlapping events merge into one busy span because the cursor only ever
/// moves forward.
pub fn compute_free_slots(
    events: &[Event],
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
    min_minutes: i64,
) -> Vec<FreeSlot> {
    let mut sorted: Vec<&Event> = events
        .iter()
        .filter(|event| event.overlaps(day_start, day_end))
        .collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

    let mut slots = Vec::new();
    let mut cursor = day_start;

    for event in sorted {
        let start = event.start.clamp(day_start, day_end);
        let end = event.end.clamp(day_start, day_end);

        if cursor < start {
            slots.extend(slot_if_fits(cursor, start, min_minutes));
        }
        cursor = cursor.max(end);
    }

    if cursor < day_end {
        slots.extend(slot_if_fits(cursor, day_end, min_minutes));
    }

    slots
}
