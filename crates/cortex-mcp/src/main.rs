//! Cortex MCP Server
//!
//! Exposes the Cortex cognitive substrate (four memory tiers, protection
//! kernel, intent router, agent dispatcher) to a coding assistant over
//! stdio JSON-RPC, per the Model Context Protocol.

mod protocol;
mod server;
mod tools;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use cortex_core::config::Config;
use cortex_core::state::State;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

/// Parse command-line arguments and return the optional brain directory
/// override. Exits the process if `--help` or `--version` is requested.
fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut brain_dir: Option<PathBuf> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("Cortex MCP Server v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Cognitive substrate for a coding assistant, served over stdio MCP.");
                println!();
                println!("USAGE:");
                println!("    cortex-mcp [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --brain-dir <PATH>      Override CORTEX_BRAIN_DIR");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                Log level filter (e.g., debug, info, warn)");
                println!("    CORTEX_BRAIN_DIR        Root directory for the four memory tiers");
                println!("    CORTEX_CAPACITY_TIER1   Max concurrent conversations");
                println!("    CORTEX_DECAY_DAYS       Comma-separated soft,hard,delete_candidate,delete");
                println!("    CORTEX_REQUEST_DEADLINE_MS");
                println!("    CORTEX_LEARNING_THRESHOLD");
                println!("    CORTEX_TOKEN_BUDGET");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("cortex-mcp {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--brain-dir" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --brain-dir requires a path argument");
                    std::process::exit(1);
                }
                brain_dir = Some(PathBuf::from(&args[i]));
            }
            arg if arg.starts_with("--brain-dir=") => {
                let path = arg.strip_prefix("--brain-dir=").unwrap_or("");
                if path.is_empty() {
                    eprintln!("error: --brain-dir requires a path argument");
                    std::process::exit(1);
                }
                brain_dir = Some(PathBuf::from(path));
            }
            arg => {
                eprintln!("error: unknown argument '{}'", arg);
                eprintln!("Try 'cortex-mcp --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    brain_dir
}

#[tokio::main]
async fn main() {
    let brain_dir_override = parse_args();

    // Logging goes to stderr; stdout is reserved for JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("Cortex MCP Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = Config::from_env();
    if let Some(dir) = brain_dir_override {
        config.brain_dir = dir;
    }

    let state = match State::init(config) {
        Ok(s) => {
            info!("Cortex state initialized");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize Cortex state: {}", e);
            std::process::exit(1);
        }
    };

    // Background learning pipeline: check periodically in case a session
    // goes quiet without ever crossing the request-triggered threshold.
    {
        let state_clone = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(300)).await;
                match state_clone.learning.should_run() {
                    Ok(true) => match state_clone.learning.run_once() {
                        Ok(report) => info!(
                            events_processed = report.events_processed,
                            patterns_reinforced = report.patterns_reinforced,
                            "background learning pipeline run complete"
                        ),
                        Err(e) => warn!("background learning pipeline run failed: {}", e),
                    },
                    Ok(false) => {}
                    Err(e) => warn!("background learning pipeline should_run check failed: {}", e),
                }
            }
        });
    }

    let server = McpServer::new(state);
    let transport = StdioTransport::new();

    info!("Starting MCP server on stdio...");

    if let Err(e) = transport.run(server).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Cortex MCP Server shutting down");
}
