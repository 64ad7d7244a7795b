//! Ignite CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use ignite_foundation::IgniteConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ignite - repository containers and plugin operations
#[derive(Parser, Debug)]
#[command(name = "ignite")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Profile to use (overrides config and IGNITE_PROFILE)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one operation of a registered plugin
    Exec {
        /// Plugin id (e.g. repo-manager, hardhat)
        plugin: String,
        /// Operation name (e.g. checkoutBranch, compile)
        operation: String,
        /// Operation options as a JSON object
        #[arg(short, long, default_value = "{}")]
        options: String,
    },
    /// Mount a local repository into its container
    Mount {
        path: String,
        /// Session container, removed once stopped
        #[arg(long)]
        session: bool,
    },
    /// Stop and remove a container
    Unmount { name: String },
    /// Remove every repo-manager container
    Cleanup,
    /// List discovered SSH keys
    Keys,
    /// Check whether a repository is public
    Privacy { url: String },
    /// Print the container name for a path or URL
    Name {
        path_or_url: String,
        #[arg(long)]
        session: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = IgniteConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        IgniteConfig::default()
    });
    if let Some(profile) = args.profile {
        config.active_profile = profile;
    }

    let success = match args.command {
        Command::Exec {
            plugin,
            operation,
            options,
        } => commands::exec(&config, &plugin, &operation, &options).await?,
        Command::Mount { path, session } => commands::mount(&config, &path, !session).await?,
        Command::Unmount { name } => commands::unmount(&config, &name).await?,
        Command::Cleanup => commands::cleanup(&config).await?,
        Command::Keys => commands::keys(&config).await?,
        Command::Privacy { url } => commands::privacy(&config, &url).await?,
        Command::Name {
            path_or_url,
            session,
        } => commands::name(&config, &path_or_url, session)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
