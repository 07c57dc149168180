use crate::components::redis_service::RedisActorHandle;
use crate::components::ComponentManager;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Stop components first so no tick reaches a closed store, then the store actor
pub async fn shutdown_service(component_manager: &ComponentManager, redis_handle: &RedisActorHandle) {
    if let Err(e) = component_manager.shutdown_all().await {
        error!("Error shutting down components: {:?}", e);
    } else {
        info!("All components shut down");
    }

    if let Err(e) = redis_handle.shutdown().await {
        error!("Error shutting down Redis actor: {:?}", e);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
pub async fn wait_for_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            error!("Could not install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C, initiating graceful shutdown");
}
