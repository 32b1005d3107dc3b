use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

const DEFAULT_PORT: u16 = 4747;

#[derive(Parser, Debug)]
#[command(name = "agentation", author, version, about = "Local annotation broker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the broker.
    Server(ServerArgs),
    /// Print usage.
    Help,
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[arg(long, env = "AGENTATION_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Run only the ACP dispatcher, against an already-running HTTP Surface.
    #[arg(long, conflicts_with = "http_only")]
    pub mcp_only: bool,

    /// Run only the HTTP Surface, with no ACP dispatcher.
    #[arg(long)]
    pub http_only: bool,

    /// Base URL of the HTTP Surface the ACP dispatcher calls. Defaults to the
    /// co-hosted loopback port.
    #[arg(long, env = "AGENTATION_HTTP_URL")]
    pub http_url: Option<String>,

    #[arg(long, env = "AGENTATION_API_KEY")]
    pub api_key: Option<String>,

    #[arg(long, env = "AGENTATION_STORE", default_value = "sqlite")]
    pub store: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Combined,
    HttpOnly,
    McpOnly,
}

/// Assembled once at startup from `ServerArgs` plus the environment variables
/// that have no CLI-flag counterpart (retention, webhooks); passed down by
/// construction from here on rather than re-read from the environment.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub mode: Mode,
    pub port: u16,
    pub store_selector: String,
    pub api_key: Option<String>,
    pub http_url: String,
    pub retention_days: i64,
    pub webhook_urls: Vec<String>,
}

impl SupervisorConfig {
    pub fn assemble(args: ServerArgs) -> Self {
        let mode = match (args.mcp_only, args.http_only) {
            (true, false) => Mode::McpOnly,
            (false, true) => Mode::HttpOnly,
            _ => Mode::Combined,
        };

        let http_url = args
            .http_url
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", args.port));

        let retention_days = std::env::var("AGENTATION_EVENT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(agentation_bus::EventBus::retention_days_default);

        Self {
            mode,
            port: args.port,
            store_selector: resolve_store_selector(&args.store),
            api_key: args.api_key,
            http_url,
            retention_days,
            webhook_urls: webhook_urls_from_env(),
        }
    }
}

fn webhook_urls_from_env() -> Vec<String> {
    let mut urls = Vec::new();
    if let Ok(single) = std::env::var("AGENTATION_WEBHOOK_URL") {
        if !single.trim().is_empty() {
            urls.push(single.trim().to_string());
        }
    }
    if let Ok(list) = std::env::var("AGENTATION_WEBHOOKS") {
        urls.extend(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    urls.sort();
    urls.dedup();
    urls
}

/// `memory` selects the volatile backing. Anything already shaped like a
/// connection string passes through unchanged; a bare `sqlite` (the default)
/// resolves to the persistent state file at `~/.agentation/store.db`.
fn resolve_store_selector(store: &str) -> String {
    if store.eq_ignore_ascii_case("memory") {
        return "memory".to_string();
    }
    if store.contains("://") {
        return store.to_string();
    }
    default_sqlite_url()
}

fn default_sqlite_url() -> String {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let dir = home.join(".agentation");
    format!("sqlite://{}/store.db?mode=rwc", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_selector_passes_through() {
        assert_eq!(resolve_store_selector("memory"), "memory");
        assert_eq!(resolve_store_selector("MEMORY"), "memory");
    }

    #[test]
    fn connection_string_passes_through_unchanged() {
        assert_eq!(resolve_store_selector("sqlite://custom.db"), "sqlite://custom.db");
    }

    #[test]
    fn bare_sqlite_resolves_to_default_path() {
        let resolved = resolve_store_selector("sqlite");
        assert!(resolved.starts_with("sqlite://"));
        assert!(resolved.ends_with(".agentation/store.db?mode=rwc"));
    }
}
