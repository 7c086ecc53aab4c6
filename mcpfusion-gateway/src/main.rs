//! Gateway binary: loads configuration, opens the store, builds the
//! dispatcher and, for `serve`, hands it off to an MCP transport.
//!
//! The MCP protocol transport itself (SSE / streamable HTTP framing) is
//! out of scope (spec §1): this binary assumes that role is played by an
//! external collaborator that calls [`mcpfusion_gateway::Dispatcher::dispatch`]
//! per inbound tool call and relays the result.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcpfusion_auth::AuthManager;
use mcpfusion_config::ConfigLoader;
use mcpfusion_gateway::{Dispatcher, GatewayConfig};
use mcpfusion_store::Store;

#[derive(Parser)]
#[command(name = "mcpfusion-gateway")]
#[command(about = "MCPFusion tool gateway")]
struct Cli {
    /// Path to the gateway's own TOML configuration file.
    #[arg(short, long, default_value = "./mcpfusion-gateway.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration, open the store, and report readiness.
    Serve,
    /// Load and validate the service/endpoint configuration, then exit.
    ValidateConfig,
    /// List the tools that would be registered for the current configuration.
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let gateway_config = GatewayConfig::from_file_or_default(&cli.config).context("loading gateway configuration")?;
    init_tracing(&gateway_config.log_level);

    let loaded = ConfigLoader::load(&gateway_config.config_paths).context("loading service/endpoint configuration")?;

    match cli.command {
        Commands::ValidateConfig => {
            tracing::info!(services = loaded.services.len(), commands = loaded.commands.len(), "configuration is valid");
            Ok(())
        }
        Commands::Tools => {
            let registry = mcpfusion_gateway::ToolRegistry::build(&loaded);
            for tool in registry.list() {
                println!("{}", tool.name);
            }
            Ok(())
        }
        Commands::Serve => {
            let store = Store::open(&gateway_config.store_path).context("opening persistent store")?;
            let auth = Arc::new(AuthManager::new(store.clone(), reqwest::Client::new()));
            let dispatcher = Dispatcher::new(loaded, gateway_config.clone(), store, auth);

            tracing::info!(
                tools = dispatcher.registry().len(),
                host = %gateway_config.transport.host,
                port = gateway_config.transport.port,
                "gateway ready; awaiting tool calls from the MCP transport"
            );

            // Transport wiring lives outside this crate; nothing left to
            // drive here beyond keeping the process alive for an external
            // supervisor to attach a transport to `dispatcher`.
            let _ = dispatcher;
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
