//! # eight-sleep-mcp
//!
//! MCP (Model Context Protocol) server exposing an Eight Sleep pod to AI
//! agents. Runs as a stdio JSON-RPC server, launched by an agent host.
//!
//! ## Architecture
//!
//! ```text
//! main.rs     entry point, config loading, MCP server launch
//! config.rs   JSON file / env-var configuration loading
//! client.rs   authenticated HTTP client for the vendor REST API
//! api.rs      typed operations (temperature, sleep, alarms, schedules, ...)
//! models.rs   vendor payloads and result shapes
//! tools.rs    tool definitions and handlers
//! mcp.rs      MCP JSON-RPC protocol handler (stdio)
//! ```
//!
//! stdout carries protocol traffic only; all logging goes to stderr.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use eight_sleep_mcp::api::EightSleepApi;
use eight_sleep_mcp::client::EightSleepClient;
use eight_sleep_mcp::config::{Cli, Config};
use eight_sleep_mcp::mcp;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("eight-sleep-mcp: {e}");
            std::process::exit(1);
        }
    };

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    info!("eight-sleep-mcp v{} starting", env!("CARGO_PKG_VERSION"));
    info!("API {} (timezone {})", config.api.api_url, config.api.timezone);
    if let Some(port) = config.port {
        info!("PORT={port} set; serving on stdio only");
    }
    if !config.credentials.is_complete() {
        warn!("Eight Sleep credentials incomplete: tool calls will fail until EIGHT_SLEEP_EMAIL and EIGHT_SLEEP_PASSWORD are set");
    }

    let client = match EightSleepClient::new(config.credentials, &config.api) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("eight-sleep-mcp: {e}");
            std::process::exit(1);
        }
    };
    let api = Arc::new(EightSleepApi::new(client, config.api.timezone));

    mcp::run_stdio(api).await;
    info!("stdin closed, shutting down");
}
