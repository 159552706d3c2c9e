pub mod finder;

pub use finder::{compute_free_slots, day_window};

use crate::components::store::models::{FreeSlot, WorkingHours};
use crate::components::store::Store;
use crate::config::Config;
use crate::error::{invalid_input, AppResult};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::debug;

/// Finds open windows in a user's working day
#[derive(Clone)]
pub struct FreeSlotFinder {
    store: Arc<dyn Store>,
    tz: Tz,
    default_hours: WorkingHours,
    default_minutes: i64,
}

impl FreeSlotFinder {
    /// Create a finder using the configured timezone and defaults
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            store,
            tz: config.tz(),
            default_hours: config.default_working_hours.clone(),
            default_minutes: config.default_slot_minutes,
        }
    }

    /// Working hours for `user_id`: explicit, then stored, then the default
    pub async fn working_hours_for(
        &self,
        user_id: &str,
        explicit: Option<WorkingHours>,
    ) -> AppResult<WorkingHours> {
        if let Some(hours) = explicit {
            return Ok(hours);
        }
        Ok(self
            .store
            .get_working_hours(user_id)
            .await?
            .unwrap_or_else(|| self.default_hours.clone()))
    }

    /// Open slots of at least `min_duration_minutes` on `target_date`
    pub async fn find_free_slots(
        &self,
        user_id: &str,
        target_date: NaiveDate,
        min_duration_minutes: Option<i64>,
        working_hours: Option<WorkingHours>,
    ) -> AppResult<Vec<FreeSlot>> {
        let min_minutes = min_duration_minutes.unwrap_or(self.default_minutes);
        if min_minutes <= 0 {
            return Err(invalid_input("Duration must be a positive number of minutes"));
        }

        let hours = self.working_hours_for(user_id, working_hours).await?;
        let (day_start, day_end) = day_window(target_date, &hours, self.tz)?;

        let events = self
            .store
            .events_overlapping(user_id, day_start, day_end)
            .await?;
        let slots = compute_free_slots(&events, day_start, day_end, min_minutes);

        debug!(
            "Found {} free slots for {} on {} among {} events",
            slots.len(),
            user_id,
            target_date,
            events.len()
        );
        Ok(slots)
    }
}
