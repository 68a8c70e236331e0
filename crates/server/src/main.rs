mod bootstrap;
mod crm;
mod errors;
mod health;
mod routes;

use std::future::IntoFuture;
use std::pin::pin;
use std::time::Duration;

use anyhow::Result;
use debrief_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use debrief_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so config errors surface through main's Result.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        session_backend = app.config.session.backend.as_str(),
        model = %app.config.llm.model,
        "debrief-server listening"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let (stopping_tx, mut stopping_rx) = watch::channel(());
    let server = axum::serve(listener, routes::router(app.state.clone()))
        .with_graceful_shutdown(async move {
            wait_for_shutdown().await;
            let _ = stopping_tx.send(());
        })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = stopping_rx.changed() => match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => result?,
            Err(_) => tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "in-flight requests did not drain in time"
            ),
        },
    }

    if let Some(sweeper) = app.sweeper {
        sweeper.abort();
    }
    tracing::info!(event_name = "system.server.stopped", "debrief-server stopped");

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(event_name = "system.server.signal_failed", error = %error);
        std::future::pending::<()>().await;
    }
    tracing::info!(event_name = "system.server.stopping", "shutdown signal received");
}
