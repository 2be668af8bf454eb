// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP implementations of the node-to-node transport ports.

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use std::sync::Arc;

use troops_core::domain::directive::Directive;
use troops_core::domain::error::LinkError;
use troops_core::domain::link::{SubordinateLink, SuperiorConnector, SuperiorLink};
use troops_core::domain::node::{CacheToken, NodeId, NodeInfo, PollOutcome};
use troops_core::domain::work::{Report, Work};
use troops_core::presentation::api::{etag, parse_etag};

use crate::transport::{default_client, endpoint_url, send, send_json};

/// Calls a superior's `/subordinates` routes.
pub struct HttpSuperiorLink {
    base_url: String,
    client: Client,
}

impl HttpSuperiorLink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(default_client(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl SuperiorLink for HttpSuperiorLink {
    async fn register(&self, info: &NodeInfo) -> Result<NodeInfo, LinkError> {
        let url = endpoint_url(&self.base_url, &["subordinates"])?;
        send_json(self.client.post(url).json(info)).await
    }

    async fn heartbeat(&self, id: &NodeId) -> Result<(), LinkError> {
        let url = endpoint_url(&self.base_url, &["subordinates", id.as_str(), "heartbeat"])?;
        send(self.client.post(url)).await?;
        Ok(())
    }

    async fn poll_info(&self, id: &NodeId, token: Option<&CacheToken>) -> Result<PollOutcome, LinkError> {
        let url = endpoint_url(&self.base_url, &["subordinates", id.as_str()])?;
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(IF_NONE_MATCH, etag(token));
        }

        let response = send(request).await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PollOutcome::NotModified);
        }
        let header_token = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(parse_etag);
        let info: NodeInfo = response
            .json()
            .await
            .map_err(|e| LinkError::Transport(format!("invalid response body: {}", e)))?;
        let token = header_token.unwrap_or_else(|| info.cache_token());
        Ok(PollOutcome::Modified { info, token })
    }

    async fn submit_work(&self, id: &NodeId, work: &Work) -> Result<(), LinkError> {
        let url = endpoint_url(&self.base_url, &["subordinates", id.as_str(), "work"])?;
        send(self.client.post(url).json(work)).await?;
        Ok(())
    }

    async fn submit_report(&self, id: &NodeId, report: &Report) -> Result<(), LinkError> {
        let url = endpoint_url(&self.base_url, &["subordinates", id.as_str(), "report"])?;
        send(self.client.post(url).json(report)).await?;
        Ok(())
    }
}

/// Opens [`HttpSuperiorLink`]s sharing one connection pool.
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self {
            client: default_client(),
        }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SuperiorConnector for HttpConnector {
    fn connect(&self, endpoint: &str) -> Arc<dyn SuperiorLink> {
        Arc::new(HttpSuperiorLink::with_client(self.client.clone(), endpoint))
    }
}

/// Push delivery to a subordinate's `/directives` routes.
#[derive(Clone)]
pub struct HttpSubordinateLink {
    client: Client,
}

impl HttpSubordinateLink {
    pub fn new() -> Self {
        Self {
            client: default_client(),
        }
    }
}

impl Default for HttpSubordinateLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubordinateLink for HttpSubordinateLink {
    async fn deliver(&self, endpoint: &str, directive: &Directive) -> Result<(), LinkError> {
        let url = endpoint_url(endpoint, &["directives"])?;
        send(self.client.put(url).json(directive)).await?;
        Ok(())
    }

    async fn withdraw(&self, endpoint: &str, purpose: &str) -> Result<(), LinkError> {
        let url = endpoint_url(endpoint, &["directives", purpose])?;
        send(self.client.delete(url)).await?;
        Ok(())
    }
}
