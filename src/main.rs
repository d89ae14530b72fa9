//! mcp-bridge - call MCP tools through a gateway or stdio servers
//!
#![doc = "mcp-bridge - call MCP tools through a gateway or stdio servers"]
#![doc = "Main entry point for the mcp-bridge command-line client."]

use anyhow::Result;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_bridge::cli::{Cli, Commands};
use mcp_bridge::commands;
use mcp_bridge::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Servers => {
            tracing::info!("Listing gateway servers");
            commands::servers::list_servers(&config).await
        }
        Commands::Sessions => {
            tracing::info!("Listing gateway sessions");
            commands::sessions::list_sessions(&config).await
        }
        Commands::Call {
            server,
            tool,
            args,
            stdio,
        } => {
            tracing::info!("Calling tool {} on {}", tool, server);
            commands::call::call_tool(&config, &server, &tool, &args, stdio).await
        }
        Commands::Tools { server } => {
            tracing::info!("Listing tools of stdio server {}", server);
            commands::tools::list_tools(&config, &server).await
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose {
        "mcp_bridge=debug"
    } else {
        "mcp_bridge=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
