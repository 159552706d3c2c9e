//! Runs a single reminder sweep against the configured store and prints
//! the report as JSON. Useful from cron or for checking a deployment.

use chrono::Utc;
use kalenteri::components::reminders::ReminderDispatcher;
use kalenteri::components::{store, LiveHub};
use kalenteri::error::Error;
use kalenteri::startup;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    startup::init_logging()?;

    let config = startup::load_config().await?;
    let config = config.read().await;

    let store = store::connect(&config).await;
    // Nobody is subscribed from here, notifications are only stored
    let dispatcher = ReminderDispatcher::new(store, Arc::new(LiveHub::new()), &config);

    let report = dispatcher.sweep(Utc::now()).await?;
    info!("Sweep finished, {} reminders sent", report.sent());

    let json = serde_json::to_string_pretty(&report).map_err(Error::from)?;
    println!("{}", json);
    Ok(())
}
