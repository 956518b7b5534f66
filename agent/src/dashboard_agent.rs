use anyhow::Result;
use lib_dashboard::auth::{default_token_path, TokenStore};
use lib_dashboard::ingestors::WssPushConnector;
use lib_dashboard::retrieve::{BackendApi, ResilientClient};
use lib_dashboard::DashboardEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

mod agent_logic;
use agent_logic::{config, console, logger};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = config::load_config();
    logger::setup_logging(config.log_dir(), config.log_level())?;
    let engine_config = config.engine_config()?;

    let fallback = engine_config.auth.fallback_token.clone();
    let tokens = Arc::new(
        match engine_config.auth.token_path.clone().map(PathBuf::from).or_else(default_token_path) {
            Some(path) => TokenStore::open(path, &fallback),
            None => TokenStore::in_memory(&fallback),
        },
    );
    let client = Arc::new(ResilientClient::new(&engine_config.http, &engine_config.auth, tokens.clone())?);
    let backend = Arc::new(BackendApi::new(client.clone(), engine_config.connection.status_endpoint.clone()));
    let connector = Arc::new(WssPushConnector::new(engine_config.connection.push_url.clone(), tokens));
    let engine = Arc::new(DashboardEngine::new(engine_config, connector, backend.clone()));

    let report = engine.boot().await;
    if let Some(failure) = &report.failure {
        log::warn!("{}", failure.user_message());
    }
    if let Some(theme) = &report.theme {
        log::info!("Backend prefers theme '{}'.", theme);
    }
    if let Some(theme) = &config.theme {
        if let Err(e) = backend.persist_theme(theme).await {
            log::warn!("Theme not saved: {}", e.user_message());
        }
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let console_handle = tokio::spawn(console::run(
        engine.clone(),
        client.subscribe_session(),
        shutdown_tx.subscribe(),
    ));
    engine.start();

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    let _ = shutdown_tx.send(());
    engine.shutdown().await;
    let _ = console_handle.await;

    log::info!("Shutdown complete.");
    Ok(())
}
