pub mod bridge;
pub mod command;
pub mod config;
pub mod expression;
pub mod input;
pub mod telemetry;

use crate::bridge::{spawn_console_source, Bridge};
use crate::command::LoggingKeyboard;
use crate::config::AppConfig;
use crate::telemetry::ConnectionClient;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path).await?;
    info!("Loaded {} actions", config.actions.len());

    let client = ConnectionClient::spawn(Some((&config.connection).into()));

    let (bridge, mut display) = Bridge::new(&config, client.clone(), Arc::new(LoggingKeyboard))
        .map_err(|e| eyre!("Failed to create bridge: {}", e))?;

    let _display_handle = tokio::spawn(async move {
        while let Some(update) = display.recv().await {
            info!(
                context = %update.context,
                state = update.state,
                "Display: {}",
                update.title
            );
        }
    });

    let (events_tx, events_rx) = mpsc::channel(100);
    let _console_handle = spawn_console_source(events_tx);

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                ctrl_c.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    bridge.run(events_rx, shutdown).await;
    client.shutdown();

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
