// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # SensingTroops node host CLI
//!
//! The `troops` binary hosts one node of the sensing tree per process and
//! drives a running root from the command line.
//!
//! ## Commands
//!
//! - `troops directory|root|relay|leaf` - Serve a node with the given role
//! - `troops campaign submit|remove|list|reports|status` - Operate a root
//! - `troops config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use troops_cli::commands::{self, CampaignCommand, ConfigCommand, RootTarget};
use troops_cli::{serve, telemetry};
use troops_core::domain::node_config::{NodeConfigManifest, ServiceRole};

/// SensingTroops - hierarchical sensor data collection
#[derive(Parser)]
#[command(name = "troops")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "TROOPS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TROOPS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the roster directory
    #[command(name = "directory")]
    Directory(ServeArgs),

    /// Serve the root (commander) node
    #[command(name = "root")]
    Root(ServeArgs),

    /// Serve a relay (leader) node
    #[command(name = "relay")]
    Relay(ServeArgs),

    /// Serve a leaf (sensor) node
    #[command(name = "leaf")]
    Leaf(ServeArgs),

    /// Campaign operations against a running root
    #[command(name = "campaign")]
    Campaign {
        #[command(flatten)]
        target: RootTarget,

        #[command(subcommand)]
        command: CampaignCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Roster id of this node
    #[arg(long, env = "TROOPS_NODE_ID")]
    id: Option<String>,

    /// HTTP API port
    #[arg(long, env = "TROOPS_PORT")]
    port: Option<u16>,

    /// Base URL of the directory service
    #[arg(long, env = "TROOPS_DIRECTORY_URL")]
    directory_url: Option<String>,

    /// Roster file (directory role)
    #[arg(long, value_name = "FILE")]
    roster: Option<PathBuf>,
}

impl ServeArgs {
    fn apply(self, config: &mut NodeConfigManifest, role: ServiceRole) {
        config.spec.node.role = role;
        if let Some(id) = self.id {
            config.spec.node.id = id;
        }
        if let Some(port) = self.port {
            config.spec.network.port = port;
        }
        if let Some(url) = self.directory_url {
            config.spec.directory.url = Some(url);
        }
        if let Some(roster) = self.roster {
            config.spec.directory.roster_path = Some(roster);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Directory(args)) => host(cli.config, &cli.log_level, args, ServiceRole::Directory).await,
        Some(Commands::Root(args)) => host(cli.config, &cli.log_level, args, ServiceRole::Root).await,
        Some(Commands::Relay(args)) => host(cli.config, &cli.log_level, args, ServiceRole::Relay).await,
        Some(Commands::Leaf(args)) => host(cli.config, &cli.log_level, args, ServiceRole::Leaf).await,
        Some(Commands::Campaign { target, command }) => {
            telemetry::init_logging(&cli.log_level, "text")?;
            commands::campaign::handle_command(command, target).await
        }
        Some(Commands::Config { command }) => {
            telemetry::init_logging(&cli.log_level, "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

async fn host(
    config_path: Option<PathBuf>,
    log_level: &str,
    args: ServeArgs,
    role: ServiceRole,
) -> Result<()> {
    let mut config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    args.apply(&mut config, role);

    let (level, format) = telemetry::logging_settings(Some(&config), log_level);
    telemetry::init_logging(&level, &format)?;
    telemetry::init_metrics(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SensingTroops {:?} node", role);
    serve::run(config).await
}
