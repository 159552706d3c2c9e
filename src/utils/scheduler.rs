use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;

/// Source of the current instant, injected so ticks can be driven in tests
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trait for periodic jobs that run on a timer
#[async_trait]
pub trait Scheduler: Send + Sync + 'static {
    /// What one run of the job produces
    type Report: Send + 'static;

    /// Start ticking in the background
    fn start(&self) -> AppResult<()>;

    /// Stop ticking and wait for an in-flight run to finish
    async fn stop(&self) -> AppResult<()>;

    /// Run the job immediately, outside the timer
    async fn tick_now(&self) -> AppResult<Self::Report>;
}
