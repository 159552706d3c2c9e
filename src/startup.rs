use crate::components::{store, ComponentManager, Reminders, Services};
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Register every component the build knows about
pub fn build_components(config: Arc<RwLock<Config>>) -> ComponentManager {
    let mut component_manager = ComponentManager::new(config);

    component_manager.register(Reminders::new());

    #[cfg(feature = "web-interface")]
    component_manager.register(crate::components::web_api::WebApi::new());

    component_manager
}

/// Connect the store, start all components and run until a shutdown signal
pub async fn start_service(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let store = {
        let config_read = config.read().await;
        info!(
            "Using timezone {} and default working hours {}-{}",
            config_read.timezone,
            config_read.default_working_hours.start,
            config_read.default_working_hours.end
        );
        store::connect(&config_read).await
    };
    let services = Services::new(store);

    let component_manager = Arc::new(build_components(Arc::clone(&config)));
    component_manager.init_all(services).await?;
    info!(
        "Components started: {}",
        component_manager.component_names().join(", ")
    );

    shutdown::handle_signals(component_manager).await;
    info!("Kalenteri stopped");
    Ok(())
}
