//! VibeLink host entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting VibeLink host");

    let config = config::Config::load()?;
    tracing::info!(
        port = config.port,
        auto_start = config.auto_start,
        strict_commands = config.strict_commands,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("host shut down cleanly");
    Ok(())
}
