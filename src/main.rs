use muistuttaja::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting muistuttaja reminder service");

    // Load configuration
    let config = startup::load_config()?;

    // Run until SIGINT/SIGTERM
    startup::run_service(config).await
}
