//! Compute CLI - per-user isolated SSH-reachable environments on Kubernetes

use clap::{Parser, Subcommand};
use compute_core::ComputeConfig;
use compute_store::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::{Context, Identity};
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "compute")]
#[command(version)]
#[command(about = "Per-user isolated SSH-reachable environments on Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/compute/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overriding the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Act as this user ID
    #[arg(long, global = true, conflicts_with = "api_key")]
    user_id: Option<i64>,

    /// Authenticate with an API key (raw or "Bearer <key>")
    #[arg(long, global = true, env = "COMPUTE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage containers
    #[command(subcommand)]
    Container(ContainerCommand),

    /// Manage SSH public keys
    #[command(subcommand)]
    SshKey(SshKeyCommand),

    /// Manage API keys
    #[command(subcommand)]
    ApiKey(ApiKeyCommand),
}

#[derive(Subcommand)]
enum ContainerCommand {
    /// Create a container and wait for provisioning
    Create {
        /// Container name
        #[arg(short, long)]
        name: String,

        /// Memory limit in MiB
        #[arg(long)]
        memory: Option<u32>,

        /// Volume size in GiB
        #[arg(long)]
        storage: Option<u32>,

        /// SSH key ID to authorize (repeatable, order is kept)
        #[arg(short = 'k', long = "ssh-key", required = true)]
        ssh_keys: Vec<i64>,
    },

    /// List containers
    List,

    /// Show a container, refreshed from the cluster
    Get {
        /// Container ID
        id: String,
    },

    /// Stop a container (keeps its volume and address)
    Stop {
        /// Container ID
        id: String,
    },

    /// Start a stopped container
    Start {
        /// Container ID
        id: String,
    },

    /// Delete a container and everything in its namespace
    Delete {
        /// Container ID
        id: String,
    },
}

#[derive(Subcommand)]
enum SshKeyCommand {
    /// Register an SSH public key
    Add {
        /// Key name
        #[arg(short, long)]
        name: String,

        /// Public key line
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        key: Option<String>,

        /// Read the public key from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List SSH keys
    List,

    /// Delete an SSH key
    Delete {
        /// SSH key ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum ApiKeyCommand {
    /// Create an API key (the secret is shown once)
    Create {
        /// Key name
        #[arg(short, long)]
        name: String,
    },

    /// List API keys
    List,

    /// Delete an API key
    Delete {
        /// API key ID
        id: i64,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_context(cli: &Cli) -> Result<Context> {
    let mut config = match &cli.config {
        Some(path) => ComputeConfig::load_from(path)?,
        None => ComputeConfig::load()?,
    };
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }

    let store = SqliteStore::open_at(&config.database.path)?;
    let identity = match (cli.user_id, &cli.api_key) {
        (Some(id), _) => Some(Identity::UserId(id)),
        (None, Some(key)) => Some(Identity::ApiKey(key.clone())),
        (None, None) => None,
    };

    Ok(Context {
        config,
        store: Arc::new(store),
        identity,
        json: cli.json,
    })
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = load_context(&cli)?;

    match cli.command {
        Commands::Container(cmd) => match cmd {
            ContainerCommand::Create {
                name,
                memory,
                storage,
                ssh_keys,
            } => commands::container::create(&ctx, &name, memory, storage, ssh_keys).await,
            ContainerCommand::List => commands::container::list(&ctx).await,
            ContainerCommand::Get { id } => commands::container::get(&ctx, &id).await,
            ContainerCommand::Stop { id } => commands::container::stop(&ctx, &id).await,
            ContainerCommand::Start { id } => commands::container::start(&ctx, &id).await,
            ContainerCommand::Delete { id } => commands::container::delete(&ctx, &id).await,
        },

        Commands::SshKey(cmd) => match cmd {
            SshKeyCommand::Add { name, key, file } => {
                let public_key = match (key, file) {
                    (Some(key), _) => key,
                    (None, Some(path)) => std::fs::read_to_string(&path)?,
                    (None, None) => {
                        return Err(CliError::usage(
                            "no public key given",
                            "pass --key or --file",
                        ));
                    }
                };
                commands::ssh_key::add(&ctx, &name, &public_key).await
            }
            SshKeyCommand::List => commands::ssh_key::list(&ctx).await,
            SshKeyCommand::Delete { id } => commands::ssh_key::delete(&ctx, id).await,
        },

        Commands::ApiKey(cmd) => match cmd {
            ApiKeyCommand::Create { name } => commands::api_key::create(&ctx, &name).await,
            ApiKeyCommand::List => commands::api_key::list(&ctx).await,
            ApiKeyCommand::Delete { id } => commands::api_key::delete(&ctx, id).await,
        },
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            code
        }
    };
    std::process::exit(code);
}
