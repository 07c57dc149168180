use crate::components::redis_service::RedisActor;
use crate::components::{CalendarReminders, ComponentManager};
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
                .unwrap_or_else(|_| EnvFilter::new("info,serenity=warn,reqwest=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => {
            info!("Loaded configuration: {:?}", config);
            Ok(Arc::new(RwLock::new(config)))
        }
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start the document store actor and the components, then run until signalled
pub async fn run_service(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let (mut redis_actor, redis_handle) = RedisActor::new(Arc::clone(&config)).await?;
    let redis_task = tokio::spawn(async move {
        redis_actor.run().await;
    });

    let mut component_manager = ComponentManager::new(Arc::clone(&config));
    component_manager.register(CalendarReminders::new());

    component_manager.init_all(redis_handle.clone()).await?;
    info!("Reminder service running");

    shutdown::wait_for_signal().await;
    info!("Shutting down reminder service");

    shutdown::shutdown_service(&component_manager, &redis_handle).await;
    if let Err(e) = redis_task.await {
        error!("Redis actor task failed: {:?}", e);
    }

    Ok(())
}
