// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use troops_core::domain::node_config::{NodeConfigManifest, ServiceRole};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./troops-config.yaml)
        #[arg(short, long, default_value = "./troops-config.yaml")]
        output: PathBuf,

        /// Role the generated node plays
        #[arg(long, value_enum, default_value_t = RoleArg::Leaf)]
        role: RoleArg,

        /// Roster id of the generated node
        #[arg(long, default_value = "l1")]
        id: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Directory,
    Root,
    Relay,
    Leaf,
}

impl From<RoleArg> for ServiceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Directory => ServiceRole::Directory,
            RoleArg::Root => ServiceRole::Root,
            RoleArg::Relay => ServiceRole::Relay,
            RoleArg::Leaf => ServiceRole::Leaf,
        }
    }
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, role, id } => generate(output, role.into(), id).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. TROOPS_CONFIG_PATH: {}",
            std::env::var("TROOPS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./troops-config.yaml");
        println!("  4. ~/.troops/config.yaml");
        println!("  5. /etc/troops/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;
    println!("{}", "Node Identity:".bold());
    println!("  ID: {}", spec.node.id);
    println!("  Name: {}", config.display_name());
    println!("  Role: {:?}", spec.node.role);
    if let Some(place) = &spec.node.place {
        println!("  Place: {}", place);
    }
    println!();

    println!("{}", "Network:".bold());
    println!("  Bind: {}:{}", spec.network.bind_address, spec.network.port);
    println!("  Advertised endpoint: {}", config.advertised_endpoint());
    println!(
        "  Directory: {}",
        spec.directory.url.as_deref().unwrap_or("(none)")
    );
    if let Some(roster) = &spec.directory.roster_path {
        println!("  Roster: {}", roster.display());
    }
    println!();

    println!("{}", "Liveness:".bold());
    println!("  Mode: {:?}", spec.liveness.mode);
    println!("  Interval: {}s", spec.liveness.interval_seconds);
    println!("  Deadline: {}s", spec.liveness.deadline_seconds);
    println!("  Push directives: {}", spec.liveness.push_directives);
    println!(
        "  Retry: {} attempts, {}ms x{}",
        spec.retry.max_attempts, spec.retry.initial_delay_ms, spec.retry.multiplier
    );
    println!();

    match spec.node.role {
        ServiceRole::Root => {
            println!("{}", "Root:".bold());
            println!("  Report cache: {}", spec.reports.cache_capacity);
            println!(
                "  Alert webhook: {}",
                spec.alerts.webhook_url.as_deref().unwrap_or("(log only)")
            );
            println!();
        }
        ServiceRole::Leaf if !spec.readings.static_values.is_empty() => {
            println!("{}", "Static readings:".bold());
            for (name, reading) in &spec.readings.static_values {
                println!(
                    "  {} = {} {}",
                    name,
                    reading.value,
                    reading.unit.as_deref().unwrap_or("")
                );
            }
            println!();
        }
        _ => {}
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

/// Sample configuration for `role`, valid as generated.
pub fn sample_config(role: ServiceRole, id: String) -> NodeConfigManifest {
    let mut config = NodeConfigManifest::default();
    config.metadata.name = format!("{:?}-{}", role, id).to_lowercase();
    config.spec.node.id = id;
    config.spec.node.role = role;
    match role {
        ServiceRole::Directory => {
            config.spec.directory.roster_path = Some(PathBuf::from("./roster.yaml"));
        }
        ServiceRole::Root | ServiceRole::Relay | ServiceRole::Leaf => {
            config.spec.directory.url = Some("http://127.0.0.1:52000/".to_string());
        }
    }
    config
}

async fn generate(output: PathBuf, role: ServiceRole, id: String) -> Result<()> {
    let config = sample_config(role, id);
    config
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
