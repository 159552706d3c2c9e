pub mod dispatcher;
mod notifications;
pub mod scheduler;

pub use dispatcher::{ReminderDispatcher, ReminderKind, SweepFailure, SweepReport};
pub use scheduler::ReminderScheduler;

use super::Services;
use crate::config::{component_names, Config};
use crate::error::AppResult;
use crate::utils::scheduler::{Scheduler, SystemClock};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Build a dispatcher/scheduler pair from the config
pub fn build_scheduler(config: &Config, services: &Services) -> ReminderScheduler {
    let dispatcher = ReminderDispatcher::new(
        Arc::clone(&services.store),
        services.live.clone(),
        config,
    );

    ReminderScheduler::new(
        Arc::new(dispatcher),
        Arc::new(SystemClock),
        Duration::from_secs(config.reminder_interval_secs),
        Duration::from_secs(config.reminder_sweep_timeout_secs),
    )
}

/// Reminders component: owns the periodic dispatcher
#[derive(Default)]
pub struct Reminders {
    scheduler: RwLock<Option<Arc<ReminderScheduler>>>,
}

impl Reminders {
    /// Create a new Reminders component
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the scheduler if the component has been initialized
    pub async fn get_scheduler(&self) -> Option<Arc<ReminderScheduler>> {
        let scheduler_lock = self.scheduler.read().await;
        scheduler_lock.clone()
    }
}

#[async_trait]
impl super::Component for Reminders {
    fn name(&self) -> &'static str {
        component_names::REMINDERS
    }

    async fn init(&self, config: Arc<RwLock<Config>>, services: Services) -> AppResult<()> {
        let mut scheduler_lock = self.scheduler.write().await;
        if scheduler_lock.is_some() {
            warn!("Reminder scheduler is already running, skipping initialization");
            return Ok(());
        }

        let scheduler = {
            let config_read = config.read().await;
            Arc::new(build_scheduler(&config_read, &services))
        };
        scheduler.start()?;
        *scheduler_lock = Some(scheduler);

        info!("Reminders component initialized");
        Ok(())
    }

    async fn shutdown(&self) -> AppResult<()> {
        let scheduler = self.scheduler.write().await.take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
