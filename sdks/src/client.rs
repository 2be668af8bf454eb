// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use reqwest::Client;

use troops_core::domain::directive::Campaign;
use troops_core::domain::node::NodeInfo;
use troops_core::domain::work::Report;

use crate::transport::{default_client, endpoint_url, send, send_json};

/// Operator client for a root node.
pub struct RootClient {
    base_url: String,
    client: Client,
}

impl RootClient {
    /// Create a client for the root served at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: default_client(),
        }
    }

    /// Submit a campaign, replacing any active one with the same purpose.
    pub async fn submit_campaign(&self, campaign: &Campaign) -> Result<Campaign> {
        let url = endpoint_url(&self.base_url, &["campaigns"])?;
        let accepted = send_json(self.client.post(url).json(campaign))
            .await
            .with_context(|| format!("Failed to submit campaign '{}'", campaign.purpose))?;
        Ok(accepted)
    }

    /// Remove a campaign and everything derived from it.
    pub async fn remove_campaign(&self, purpose: &str) -> Result<()> {
        let url = endpoint_url(&self.base_url, &["campaigns", purpose])?;
        send(self.client.delete(url))
            .await
            .with_context(|| format!("Failed to remove campaign '{}'", purpose))?;
        Ok(())
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let url = endpoint_url(&self.base_url, &["campaigns"])?;
        Ok(send_json(self.client.get(url)).await.context("Failed to list campaigns")?)
    }

    /// Reports held in the root's cache, oldest first.
    pub async fn reports(&self) -> Result<Vec<Report>> {
        let url = endpoint_url(&self.base_url, &["reports"])?;
        Ok(send_json(self.client.get(url)).await.context("Failed to fetch reports")?)
    }

    pub async fn node_info(&self) -> Result<NodeInfo> {
        let url = endpoint_url(&self.base_url, &["info"])?;
        Ok(send_json(self.client.get(url)).await.context("Failed to fetch node info")?)
    }

    pub async fn list_subordinates(&self) -> Result<Vec<NodeInfo>> {
        let url = endpoint_url(&self.base_url, &["subordinates"])?;
        Ok(send_json(self.client.get(url))
            .await
            .context("Failed to list subordinates")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troops_core::domain::directive::{Placement, Trigger};

    fn campaign() -> Campaign {
        Campaign {
            author: "operator".to_string(),
            destination: "memory://weather".to_string(),
            place: Placement::All,
            purpose: "p1".to_string(),
            requirements: ["temperature".to_string()].into_iter().collect(),
            trigger: Trigger::timer(10),
        }
    }

    #[tokio::test]
    async fn test_submit_campaign() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/campaigns")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"purpose": "p1", "place": "All"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&campaign()).unwrap())
            .create_async()
            .await;

        let client = RootClient::new(server.url());
        let accepted = client.submit_campaign(&campaign()).await.unwrap();
        assert_eq!(accepted, campaign());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remove_unknown_campaign_reports_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/campaigns/p9")
            .with_status(404)
            .with_body(r#"{"kind":"not_found","subject":"p9","message":"not found: p9"}"#)
            .create_async()
            .await;

        let client = RootClient::new(server.url());
        let err = client.remove_campaign("p9").await.unwrap_err();
        assert!(format!("{:#}", err).contains("not found: p9"));
    }
}
