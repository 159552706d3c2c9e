use super::dispatcher::{ReminderDispatcher, SweepReport};
use crate::error::{component_error, store_error, AppResult};
use crate::utils::scheduler::{Clock, Scheduler};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running timer task
struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs the reminder dispatcher on a fixed period.
///
/// Sweeps never overlap: timer ticks and `tick_now` share one guard.
pub struct ReminderScheduler {
    dispatcher: Arc<ReminderDispatcher>,
    clock: Arc<dyn Clock>,
    period: Duration,
    sweep_timeout: Duration,
    sweep_guard: Arc<Mutex<()>>,
    running: std::sync::Mutex<Option<Running>>,
}

impl ReminderScheduler {
    /// Create a stopped scheduler
    pub fn new(
        dispatcher: Arc<ReminderDispatcher>,
        clock: Arc<dyn Clock>,
        period: Duration,
        sweep_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            clock,
            period,
            sweep_timeout,
            sweep_guard: Arc::new(Mutex::new(())),
            running: std::sync::Mutex::new(None),
        }
    }

    /// Whether the timer task is active
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|running| running.is_some())
            .unwrap_or(false)
    }

    /// One guarded, time-limited sweep
    async fn run_sweep(
        dispatcher: &ReminderDispatcher,
        clock: &dyn Clock,
        guard: &Mutex<()>,
        sweep_timeout: Duration,
    ) -> AppResult<SweepReport> {
        let _guard = guard.lock().await;
        let now = clock.now();

        match timeout(sweep_timeout, dispatcher.sweep(now)).await {
            Ok(result) => result,
            Err(_) => {
                // The abandoned sweep never reached its own release
                dispatcher.release_lease().await;
                Err(store_error(&format!(
                    "Reminder sweep did not finish within {:?}",
                    sweep_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl Scheduler for ReminderScheduler {
    type Report = SweepReport;

    fn start(&self) -> AppResult<()> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| component_error("Reminder scheduler state is poisoned"))?;
        if running.is_some() {
            return Err(component_error("Reminder scheduler is already running"));
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let clock = Arc::clone(&self.clock);
        let guard = Arc::clone(&self.sweep_guard);
        let period = self.period;
        let sweep_timeout = self.sweep_timeout;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            // A late tick is dropped rather than queued behind the current one
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match Self::run_sweep(&dispatcher, clock.as_ref(), &guard, sweep_timeout).await {
                            Ok(_) => {}
                            Err(e) if e.is_transient() => {
                                warn!("Reminder sweep failed, retrying next tick: {}", e);
                            }
                            Err(e) => error!("Reminder sweep failed: {}", e),
                        }
                    }
                }
            }

            info!("Reminder scheduler stopped");
        });

        info!("Reminder scheduler started, sweeping every {:?}", self.period);
        *running = Some(Running { cancel, task });
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let running = self
            .running
            .lock()
            .map_err(|_| component_error("Reminder scheduler state is poisoned"))?
            .take();

        if let Some(Running { cancel, task }) = running {
            cancel.cancel();
            task.await
                .map_err(|e| component_error(&format!("Reminder scheduler task failed: {}", e)))?;
        }
        Ok(())
    }

    async fn tick_now(&self) -> AppResult<SweepReport> {
        Self::run_sweep(
            &self.dispatcher,
            self.clock.as_ref(),
            &self.sweep_guard,
            self.sweep_timeout,
        )
        .await
    }
}
