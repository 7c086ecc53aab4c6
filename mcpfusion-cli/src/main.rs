//! Admin CLI (spec §6): the external collaborator that invokes the core's
//! API-token, user, and helper-flow operations directly against the
//! persistent store. Not part of the HTTP/MCP surface.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use mcpfusion_auth::HelperFlow;
use mcpfusion_store::Store;

#[derive(Parser)]
#[command(name = "mcpfusion")]
#[command(about = "MCPFusion admin CLI")]
struct Cli {
    /// Path to the persistent store directory.
    #[arg(long, default_value = "./mcpfusion-data")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new API token.
    TokenAdd {
        /// Free-form note identifying who or what the token is for.
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List every registered API token.
    TokenList,
    /// Delete an API token by its hash or an unambiguous hex prefix.
    TokenDelete { identifier: String },
    /// Create a new user record.
    UserAdd {
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List every user.
    UserList,
    /// Delete a user, cascading their knowledge entries and token links.
    UserDelete { user_id: String },
    /// Link an API token to a user.
    UserLink { user_id: String, token_identifier: String },
    /// Detach an API token from whichever user it is currently linked to.
    UserUnlink { token_identifier: String },
    /// Issue a helper-flow auth-code blob for a (service, tenant) pair.
    IssueAuthCode {
        service: String,
        token_identifier: String,
        /// The gateway's externally reachable base URL, embedded in the blob.
        #[arg(long)]
        server_url: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new("warn")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = Store::open(&cli.store).context("opening persistent store")?;

    match cli.command {
        Commands::TokenAdd { description } => {
            let (plaintext, hash) = store.add_api_token(&description)?;
            println!("{}", "token created; this plaintext is shown once:".yellow());
            println!("{}", plaintext.bold());
            println!("hash: {hash}");
        }
        Commands::TokenList => {
            for meta in store.list_api_tokens()? {
                println!("{}  {}  {}", meta.hash, meta.prefix.cyan(), meta.description);
            }
        }
        Commands::TokenDelete { identifier } => {
            let hash = store.resolve_api_token(&identifier)?;
            store.delete_api_token(&hash)?;
            println!("{} {hash}", "deleted token".green());
        }
        Commands::UserAdd { description } => {
            let user = store.create_user(&description)?;
            println!("{} {}", "created user".green(), user.id);
        }
        Commands::UserList => {
            for user in store.list_users()? {
                println!("{}  {}", user.id, user.description);
            }
        }
        Commands::UserDelete { user_id } => {
            store.delete_user(&user_id)?;
            println!("{} {user_id}", "deleted user".green());
        }
        Commands::UserLink { user_id, token_identifier } => {
            let hash = store.resolve_api_token(&token_identifier)?;
            store.link_api_token(&hash, &user_id)?;
            println!("{} {hash} -> {user_id}", "linked".green());
        }
        Commands::UserUnlink { token_identifier } => {
            let hash = store.resolve_api_token(&token_identifier)?;
            store.unlink_api_token(&hash)?;
            println!("{} {hash}", "unlinked".green());
        }
        Commands::IssueAuthCode { service, token_identifier, server_url } => {
            let hash = store.resolve_api_token(&token_identifier)?;
            let flow = HelperFlow::new(&store);
            let blob = flow.issue(&server_url, &service, &hash)?;
            println!("{}", blob.encode());
        }
    }

    Ok(())
}
