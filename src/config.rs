use crate::components::store::models::{WorkingHours, MAX_REMINDER_OFFSET_MINUTES};
use crate::error::{config_error, env_error, AppResult};
use crate::utils::time::parse_time;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::str::FromStr;

/// Component names known to the service
pub mod component_names {
    pub const REMINDERS: &str = "reminders";
    pub const WEB_API: &str = "web_api";
}

/// Upper bound for NOTIFICATION_RETENTION_DAYS
const MAX_RETENTION_DAYS: i64 = 3650;

/// Main configuration structure for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Redis connection string; the in-memory store is used when unset
    pub redis_url: Option<String>,
    /// Address the HTTP API binds to
    pub bind_addr: String,
    /// Port the HTTP API listens on
    pub port: u16,
    /// Timezone working hours are anchored in
    pub timezone: String,
    /// Working hours used when a user has none configured
    pub default_working_hours: WorkingHours,
    /// Slot length used when a request does not name one
    pub default_slot_minutes: i64,
    /// Seconds between reminder sweeps
    pub reminder_interval_secs: u64,
    /// Upper bound for a single sweep
    pub reminder_sweep_timeout_secs: u64,
    /// How far ahead of a todo's due date its reminder fires
    pub todo_reminder_lookahead_minutes: i64,
    /// How long notifications are kept
    pub notification_retention_days: i64,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
}

impl Default for Config {
    fn default() -> Self {
        let mut components = HashMap::new();
        components.insert(component_names::REMINDERS.to_string(), true);
        components.insert(component_names::WEB_API.to_string(), true);

        Self {
            redis_url: None,
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
            timezone: "UTC".to_string(),
            default_working_hours: WorkingHours::default(),
            default_slot_minutes: 60,
            reminder_interval_secs: 60,
            reminder_sweep_timeout_secs: 30,
            todo_reminder_lookahead_minutes: 60,
            notification_retention_days: 30,
            components,
        }
    }
}

/// Read an optional environment variable and parse it
fn parse_env<T: FromStr>(name: &str) -> AppResult<Option<T>> {
    match env::var(name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| env_error(name)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let mut config = Config::default();

        config.redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        if let Ok(bind_addr) = env::var("BIND_ADDR") {
            config.bind_addr = bind_addr;
        }
        if let Some(port) = parse_env::<u16>("PORT")? {
            config.port = port;
        }
        if let Ok(timezone) = env::var("TIMEZONE") {
            config.timezone = timezone;
        }
        if let Ok(start) = env::var("DEFAULT_WORKING_HOURS_START") {
            config.default_working_hours.start = start;
        }
        if let Ok(end) = env::var("DEFAULT_WORKING_HOURS_END") {
            config.default_working_hours.end = end;
        }
        if let Some(minutes) = parse_env::<i64>("DEFAULT_SLOT_MINUTES")? {
            config.default_slot_minutes = minutes;
        }
        if let Some(secs) = parse_env::<u64>("REMINDER_INTERVAL_SECS")? {
            config.reminder_interval_secs = secs;
        }
        if let Some(secs) = parse_env::<u64>("REMINDER_SWEEP_TIMEOUT_SECS")? {
            config.reminder_sweep_timeout_secs = secs;
        }
        if let Some(minutes) = parse_env::<i64>("TODO_REMINDER_LOOKAHEAD_MINUTES")? {
            config.todo_reminder_lookahead_minutes = minutes;
        }
        if let Some(days) = parse_env::<i64>("NOTIFICATION_RETENTION_DAYS")? {
            config.notification_retention_days = days;
        }

        // Load components configuration from file if it exists
        if let Ok(content) = fs::read_to_string("config/components.toml") {
            let file_components = toml::from_str::<HashMap<String, bool>>(&content)?;
            for (key, value) in file_components {
                config.components.insert(key, value);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> AppResult<()> {
        Tz::from_str(&self.timezone)
            .map_err(|_| config_error(&format!("Unknown timezone '{}'", self.timezone)))?;

        let start = parse_time(&self.default_working_hours.start);
        let end = parse_time(&self.default_working_hours.end);
        match (start, end) {
            (Some(start), Some(end)) if end > start => {}
            _ => {
                return Err(config_error(&format!(
                    "Invalid default working hours {}-{}",
                    self.default_working_hours.start, self.default_working_hours.end
                )))
            }
        }

        if self.default_slot_minutes <= 0 {
            return Err(config_error("DEFAULT_SLOT_MINUTES must be positive"));
        }
        if self.reminder_interval_secs == 0 {
            return Err(config_error("REMINDER_INTERVAL_SECS must be positive"));
        }
        if self.reminder_sweep_timeout_secs == 0 {
            return Err(config_error("REMINDER_SWEEP_TIMEOUT_SECS must be positive"));
        }
        if !(0..=MAX_REMINDER_OFFSET_MINUTES).contains(&self.todo_reminder_lookahead_minutes) {
            return Err(config_error(&format!(
                "TODO_REMINDER_LOOKAHEAD_MINUTES must be between 0 and {}",
                MAX_REMINDER_OFFSET_MINUTES
            )));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.notification_retention_days) {
            return Err(config_error(&format!(
                "NOTIFICATION_RETENTION_DAYS must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }

        Ok(())
    }

    /// Timezone working hours are resolved in
    pub fn tz(&self) -> Tz {
        Tz::from_str(&self.timezone).unwrap_or(Tz::UTC)
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.components.get(name).unwrap_or(&false)
    }
}
