//! Store or clear the runtime email gateway credential.
//!
//! Usage: `set_email_key <api-key>` or `set_email_key --clear`.
//! The running service picks the stored key up on its next start.

use muistuttaja::components::redis_service::{keys, RedisActor};
use muistuttaja::config::Config;
use muistuttaja::error::config_error;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    muistuttaja::startup::init_logging()?;

    let arg = std::env::args()
        .nth(1)
        .ok_or_else(|| config_error("usage: set_email_key <api-key> | --clear"))?;
    let value = match arg.trim() {
        "--clear" => None,
        "" => return Err(config_error("API key must not be empty").into()),
        key => Some(key.to_string()),
    };

    let config = Arc::new(RwLock::new(Config::load()?));
    let (mut actor, handle) = RedisActor::new(config).await?;
    let actor_task = tokio::spawn(async move { actor.run().await });

    let cleared = value.is_none();
    handle.save_setting(keys::EMAIL_API_KEY, value).await?;
    handle.shutdown().await?;
    let _ = actor_task.await;

    if cleared {
        info!("Stored email credential cleared");
    } else {
        info!("Stored email credential updated");
    }
    Ok(())
}
