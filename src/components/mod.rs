use crate::components::redis_service::RedisActorHandle;
use crate::config::Config;
use crate::error::ReminderResult;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

pub mod calendar_reminders;
pub mod redis_service;

pub use calendar_reminders::CalendarReminders;

/// A long-running part of the service with its own lifecycle
#[async_trait]
pub trait Component: Send + Sync + Any {
    /// Get the name of the component
    fn name(&self) -> &'static str;

    /// Initialize and start the component
    async fn init(&self, config: Arc<RwLock<Config>>, redis_handle: RedisActorHandle) -> ReminderResult<()>;

    /// Stop the component
    async fn shutdown(&self) -> ReminderResult<()>;

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Manager for all components
pub struct ComponentManager {
    components: Vec<Box<dyn Component>>,
    config: Arc<RwLock<Config>>,
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("component_count", &self.components.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ComponentManager {
    /// Create a new component manager
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self {
            components: Vec::new(),
            config,
        }
    }

    /// Register a component
    pub fn register<T: Component + 'static>(&mut self, component: T) {
        info!("Registering component: {}", component.name());
        self.components.push(Box::new(component));
    }

    /// Initialize the registered components that are enabled in config.
    /// A failing component is logged and the rest still start.
    pub async fn init_all(&self, redis_handle: RedisActorHandle) -> ReminderResult<()> {
        for component in &self.components {
            let enabled = self.config.read().await.is_component_enabled(component.name());
            if !enabled {
                info!("Component {} is disabled, skipping", component.name());
                continue;
            }

            info!("Initializing component: {}", component.name());
            if let Err(e) = component
                .init(Arc::clone(&self.config), redis_handle.clone())
                .await
            {
                error!("Error initializing component {}: {:?}", component.name(), e);
            }
        }

        Ok(())
    }

    /// Shutdown all components
    pub async fn shutdown_all(&self) -> ReminderResult<()> {
        info!("Shutting down all components");

        for component in &self.components {
            info!("Shutting down component: {}", component.name());

            if let Err(e) = component.shutdown().await {
                error!("Error shutting down component {}: {:?}", component.name(), e);
            }
        }

        Ok(())
    }

    /// Get a component by name
    pub fn get_component_by_name(&self, name: &str) -> Option<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }
}
