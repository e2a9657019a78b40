//! manage CLI
//!
//! Single binary for the development helpers:
//! - Tunnels from local ports to services behind the tunnel server
//! - The tunnel server itself
//! - Datastore reads and writes
//! - docker-compose against the managed compose file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use manage::commands;
use manage::output::print_error;
use mt_core::config::ConfigFile;
use mt_core::datastore::DatastoreClient;
use mt_core::AddressSpec;

#[derive(Parser)]
#[command(name = "manage")]
#[command(author, version, about = "Development helper for the service stack")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward local ports to services behind the tunnel server
    ///
    /// Without services or -L every known service is tunneled.
    Tunnel {
        /// Services to tunnel, by name
        services: Vec<String>,

        /// Extra tunnel as [bind_host:]port:host:hostport
        #[arg(short = 'L', long = "addr", value_name = "SPEC")]
        local: Vec<AddressSpec>,

        /// Tunnel server address (overrides config)
        #[arg(short, long)]
        address: Option<String>,

        /// Seconds to wait for the tunnel server (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// List the known services and exit
        #[arg(long)]
        list: bool,
    },

    /// Run the tunnel server in the foreground
    Server {
        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Seconds to wait when dialing a tunnel target (overrides config)
        #[arg(long)]
        dial_timeout: Option<u64>,
    },

    /// Read and write datastore fields
    Datastore {
        #[command(subcommand)]
        action: DatastoreAction,
    },

    /// Run docker-compose with the managed compose file
    Compose {
        /// Arguments passed to docker-compose
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DatastoreAction {
    /// Print one field, addressed as collection/id/field
    Get { fqfield: String },
    /// Check whether an object exists
    Exists { collection: String, id: u64 },
    /// Overwrite one field with a JSON value
    Set { fqfield: String, value: String },
    /// Create an object from a JSON object of fields
    Create { fqid: String, fields: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let load = || ConfigFile::load_or_default(config_path).context("Failed to load configuration");

    match cli.command {
        Commands::Tunnel { list: true, .. } => commands::list_services(&load()?.client),

        Commands::Tunnel {
            services,
            local,
            address,
            timeout,
            list: false,
        } => {
            let config = load()?;
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));
            commands::tunnel_command(config.client, &services, &local, address, timeout, cancel)
                .await
        }

        Commands::Server { bind, dial_timeout } => {
            let config = load()?;
            let cancel = CancellationToken::new();
            tokio::spawn(shutdown_on_signal(cancel.clone()));
            commands::server_command(config.server, bind, dial_timeout, cancel).await
        }

        Commands::Datastore { action } => {
            let client = DatastoreClient::new(&load()?.datastore)?;
            match action {
                DatastoreAction::Get { fqfield } => commands::datastore_get(&client, &fqfield).await,
                DatastoreAction::Exists { collection, id } => {
                    commands::datastore_exists(&client, &collection, id).await
                }
                DatastoreAction::Set { fqfield, value } => {
                    commands::datastore_set(&client, &fqfield, &value).await
                }
                DatastoreAction::Create { fqid, fields } => {
                    commands::datastore_create(&client, &fqid, &fields).await
                }
            }
        }

        Commands::Compose { args } => commands::compose_command(&load()?.compose, &args).await,

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path),
            ConfigAction::Path => {
                commands::config_path(config_path);
                Ok(())
            }
            ConfigAction::Init { force } => commands::config_init(config_path, force),
        },
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    cancel.cancel();
}
