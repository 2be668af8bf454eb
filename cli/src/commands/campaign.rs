// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Campaign management commands
//!
//! Commands: submit, remove, list, reports, status

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use troops_core::domain::directive::{Campaign, Placement, Trigger};
use troops_core::domain::work::Report;
use troops_sdk::RootClient;

#[derive(Args)]
pub struct RootTarget {
    /// Base URL of the root node
    #[arg(long, env = "TROOPS_ROOT_URL", default_value = "http://127.0.0.1:52001/")]
    pub root_url: String,
}

#[derive(Subcommand)]
pub enum CampaignCommand {
    /// Submit a campaign, replacing any active one with the same purpose
    Submit {
        /// Campaign as YAML or JSON; flags are ignored when given
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[command(flatten)]
        spec: CampaignArgs,
    },

    /// Remove a campaign and everything derived from it
    Remove {
        /// Purpose of the campaign
        purpose: String,
    },

    /// List active campaigns
    List,

    /// Show reports held by the root
    Reports {
        /// Only reports for this purpose
        #[arg(long)]
        purpose: Option<String>,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the root and its relays
    Status,
}

#[derive(Args, Debug, Default)]
pub struct CampaignArgs {
    /// Identity of the campaign
    #[arg(long, required_unless_present = "file")]
    pub purpose: Option<String>,

    /// Sink receiving the readings (e.g. http://sink:8080/records)
    #[arg(long, default_value = "")]
    pub destination: String,

    /// Relay id to target, or "All"
    #[arg(long, default_value = "All")]
    pub place: String,

    /// Reading to collect; repeat for several
    #[arg(short, long = "requirement", value_name = "NAME")]
    pub requirements: Vec<String>,

    /// Seconds between readings
    #[arg(long)]
    pub timer: Option<u64>,

    #[arg(long, default_value = "operator")]
    pub author: String,
}

impl CampaignArgs {
    pub fn into_campaign(self) -> Result<Campaign> {
        let purpose = self
            .purpose
            .filter(|p| !p.is_empty())
            .context("--purpose is required")?;
        Ok(Campaign {
            author: self.author,
            destination: self.destination,
            place: Placement::from(self.place),
            purpose,
            requirements: self.requirements.into_iter().collect::<BTreeSet<_>>(),
            trigger: Trigger { timer: self.timer },
        })
    }
}

pub async fn handle_command(command: CampaignCommand, target: RootTarget) -> Result<()> {
    let client = RootClient::new(target.root_url);
    match command {
        CampaignCommand::Submit { file, spec } => {
            let campaign = match file {
                Some(path) => load_campaign(&path)?,
                None => spec.into_campaign()?,
            };
            submit(&client, campaign).await
        }
        CampaignCommand::Remove { purpose } => remove(&client, &purpose).await,
        CampaignCommand::List => list(&client).await,
        CampaignCommand::Reports { purpose, json } => reports(&client, purpose.as_deref(), json).await,
        CampaignCommand::Status => status(&client).await,
    }
}

/// Campaign file; YAML is a superset of JSON so one parser reads both.
pub fn load_campaign(path: &Path) -> Result<Campaign> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read campaign file {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid campaign in {:?}", path))
}

async fn submit(client: &RootClient, campaign: Campaign) -> Result<()> {
    let accepted = client.submit_campaign(&campaign).await?;
    println!(
        "{}",
        format!("✓ Campaign '{}' accepted", accepted.purpose).green()
    );
    print_campaign(&accepted);
    Ok(())
}

async fn remove(client: &RootClient, purpose: &str) -> Result<()> {
    client.remove_campaign(purpose).await?;
    println!("{}", format!("✓ Campaign '{}' removed", purpose).green());
    Ok(())
}

async fn list(client: &RootClient) -> Result<()> {
    let campaigns = client.list_campaigns().await?;
    if campaigns.is_empty() {
        println!("{}", "No active campaigns".dimmed());
        return Ok(());
    }
    for campaign in &campaigns {
        print_campaign(campaign);
    }
    Ok(())
}

async fn reports(client: &RootClient, purpose: Option<&str>, json: bool) -> Result<()> {
    let reports: Vec<Report> = client
        .reports()
        .await?
        .into_iter()
        .filter(|r| purpose.is_none_or(|p| r.purpose == p))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    if reports.is_empty() {
        println!("{}", "No reports".dimmed());
        return Ok(());
    }
    for report in &reports {
        println!(
            "{} {} from {} ({} work)",
            report.time.format("%Y-%m-%d %H:%M:%S"),
            report.purpose.bold(),
            report.author,
            report.values.len()
        );
        for record in report.flatten(&report.purpose) {
            let value = record
                .value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            println!(
                "    {} {} = {} {}",
                record.place,
                record.name,
                value,
                record.unit.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn status(client: &RootClient) -> Result<()> {
    let info = client.node_info().await?;
    println!("{}", "Root:".bold());
    println!("  ID: {}", info.id);
    println!("  Name: {}", info.name);
    println!("  Endpoint: {}", info.endpoint);
    println!("  Directives: {}", info.directives.len());
    println!();

    let relays = client.list_subordinates().await?;
    println!("{} {}", "Relays:".bold(), relays.len());
    for relay in &relays {
        println!(
            "  {} ({}) at {} - {} leaves, {} missions",
            relay.id.to_string().bold(),
            relay.place.as_deref().unwrap_or("-"),
            relay.endpoint,
            relay.subordinates.len(),
            relay.directives.len()
        );
    }
    Ok(())
}

fn print_campaign(campaign: &Campaign) {
    let place: String = campaign.place.clone().into();
    let requirements: Vec<&str> = campaign.requirements.iter().map(String::as_str).collect();
    println!("  {}", campaign.purpose.bold());
    println!("    Place: {}", place);
    println!("    Requirements: {}", requirements.join(", "));
    match campaign.trigger.timer {
        Some(secs) => println!("    Timer: {}s", secs),
        None => println!("    Timer: {}", "(none)".dimmed()),
    }
    println!("    Destination: {}", campaign.destination);
    println!("    Author: {}", campaign.author);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_campaign_from_flags() {
        let args = CampaignArgs {
            purpose: Some("weather".to_string()),
            destination: "http://sink/records".to_string(),
            place: "r1".to_string(),
            requirements: vec!["temperature".to_string(), "humidity".to_string(), "temperature".to_string()],
            timer: Some(10),
            author: "operator".to_string(),
        };
        let campaign = args.into_campaign().unwrap();
        assert_eq!(campaign.purpose, "weather");
        assert_eq!(campaign.place, Placement::Node("r1".into()));
        assert_eq!(campaign.requirements.len(), 2);
        assert_eq!(campaign.trigger, Trigger::timer(10));
    }

    #[test]
    fn test_campaign_requires_purpose() {
        assert!(CampaignArgs::default().into_campaign().is_err());
    }

    #[test]
    fn test_load_campaign_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "author: operator\ndestination: memory://weather\nplace: All\npurpose: p1\nrequirements: [temperature]\ntrigger:\n  timer: 5"
        )
        .unwrap();

        let campaign = load_campaign(file.path()).unwrap();
        assert_eq!(campaign.place, Placement::All);
        assert_eq!(campaign.trigger.period(), Some(std::time::Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_remove_against_root() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/campaigns/p1")
            .with_status(204)
            .create_async()
            .await;

        let target = RootTarget {
            root_url: server.url(),
        };
        handle_command(
            CampaignCommand::Remove {
                purpose: "p1".to_string(),
            },
            target,
        )
        .await
        .unwrap();
        mock.assert_async().await;
    }
}
