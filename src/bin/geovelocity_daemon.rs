use std::env;
use std::path::PathBuf;

use geovelocity::app::Application;
use geovelocity::config::Config;

/// Service entry point: `geovelocity_daemon [config.toml]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting geovelocity daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)?;

    let app = Application::build(config)?;

    // Setup graceful shutdown signal handling
    let shutdown = app.shutdown_token();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        shutdown.cancel();
    })?;

    app.run().await?;
    log::info!("Geovelocity daemon stopped");
    Ok(())
}
