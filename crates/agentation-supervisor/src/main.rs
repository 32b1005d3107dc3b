mod config;
mod webhook;

use std::sync::Arc;

use agentation_acp::{Dispatcher, HttpClient};
use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::{Cli, Command, Mode, SupervisorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agentation_supervisor=info,agentation_http=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Help => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
        Command::Server(args) => run_server(SupervisorConfig::assemble(args)).await,
    }
}

async fn run_server(config: SupervisorConfig) -> Result<()> {
    tracing::info!(
        mode = ?config.mode,
        port = config.port,
        store = %config.store_selector,
        webhooks = config.webhook_urls.len(),
        "starting agentation"
    );

    if config.mode == Mode::McpOnly {
        let client = HttpClient::new(config.http_url.clone(), config.api_key.clone());
        let dispatcher = Dispatcher::new(client);
        tokio::select! {
            _ = agentation_acp::serve_stdio(dispatcher) => {}
            _ = shutdown_signal() => {
                tracing::info!("shutdown signal received");
            }
        }
        return Ok(());
    }

    ensure_store_parent_dir(&config.store_selector)?;
    let store = agentation_store::open_store(&config.store_selector, config.retention_days)
        .await
        .map_err(|error| {
            tracing::error!(%error, "failed to open store");
            anyhow::anyhow!(error.to_string())
        })?;
    let store = Arc::new(store);
    let bus = store.bus().clone();

    let sweeper = bus.clone().spawn_retention_sweeper();
    let webhook_tasks = webhook::spawn_delivery(&bus, config.webhook_urls.clone());

    let state = agentation_http::AppState::new(store, config.api_key.clone());
    let app = agentation_http::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "http surface listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    match config.mode {
        Mode::HttpOnly => {
            server.await?;
        }
        Mode::Combined => {
            let client = HttpClient::new(config.http_url.clone(), config.api_key.clone());
            let dispatcher = Dispatcher::new(client);
            tokio::select! {
                result = server => { result?; }
                _ = agentation_acp::serve_stdio(dispatcher) => {
                    tracing::info!("acp transport closed");
                }
            }
        }
        Mode::McpOnly => unreachable!("handled above"),
    }

    sweeper.abort();
    for task in webhook_tasks {
        task.abort();
    }
    tracing::info!("agentation shut down");
    Ok(())
}

fn ensure_store_parent_dir(selector: &str) -> Result<()> {
    let Some(path) = selector
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
    else {
        return Ok(());
    };
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_store_parent_dir_ignores_memory_selector() {
        assert!(ensure_store_parent_dir("memory").is_ok());
    }

    #[test]
    fn ensure_store_parent_dir_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("store.db");
        let selector = format!("sqlite://{}?mode=rwc", db_path.display());
        ensure_store_parent_dir(&selector).unwrap();
        assert!(db_path.parent().unwrap().is_dir());
    }
}
