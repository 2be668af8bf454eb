// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use reqwest::Client;

use troops_core::domain::directory::Resolution;
use troops_core::domain::error::LinkError;
use troops_core::domain::link::DirectoryLink;
use troops_core::domain::node::NodeId;
use troops_core::presentation::api::EndpointRegistration;

use crate::transport::{default_client, endpoint_url, send, send_json};

/// Client for the directory service's `/nodes` routes.
pub struct HttpDirectoryClient {
    base_url: String,
    client: Client,
}

impl HttpDirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: default_client(),
        }
    }

    /// Every roster position with its current endpoint.
    pub async fn list(&self) -> Result<Vec<Resolution>, LinkError> {
        let url = endpoint_url(&self.base_url, &["nodes"])?;
        send_json(self.client.get(url)).await
    }
}

#[async_trait]
impl DirectoryLink for HttpDirectoryClient {
    async fn resolve(&self, id: &NodeId) -> Result<Resolution, LinkError> {
        let url = endpoint_url(&self.base_url, &["nodes", id.as_str()])?;
        send_json(self.client.get(url)).await
    }

    async fn register_endpoint(&self, id: &NodeId, endpoint: &str) -> Result<Resolution, LinkError> {
        let url = endpoint_url(&self.base_url, &["nodes", id.as_str(), "endpoint"])?;
        let body = EndpointRegistration {
            endpoint: endpoint.to_string(),
        };
        send_json(self.client.put(url).json(&body)).await
    }

    async fn deregister(&self, id: &NodeId) -> Result<(), LinkError> {
        let url = endpoint_url(&self.base_url, &["nodes", id.as_str(), "endpoint"])?;
        send(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troops_core::domain::error::TroopError;
    use troops_core::domain::node::NodeRole;

    #[tokio::test]
    async fn test_register_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/nodes/r1/endpoint")
            .match_body(mockito::Matcher::Json(serde_json::json!({"endpoint": "http://r1:53000/"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "id": "r1",
                    "name": "leader",
                    "role": "relay",
                    "place": "floor1",
                    "endpoint": "http://r1:53000/",
                    "superior": "c1",
                    "superior_endpoint": null,
                    "children": ["l1"]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let directory = HttpDirectoryClient::new(server.url());
        let resolution = directory
            .register_endpoint(&NodeId::new("r1"), "http://r1:53000/")
            .await
            .unwrap();
        assert_eq!(resolution.role, NodeRole::Relay);
        assert_eq!(resolution.superior, Some(NodeId::new("c1")));
        assert!(resolution.superior_endpoint.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_unknown() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/nodes/x9")
            .with_status(404)
            .with_body(r#"{"kind":"not_found","subject":"x9","message":"not found: x9"}"#)
            .create_async()
            .await;

        let directory = HttpDirectoryClient::new(server.url());
        let err = directory.resolve(&NodeId::new("x9")).await.unwrap_err();
        assert_eq!(err, LinkError::Remote(TroopError::NotFound("x9".to_string())));
    }
}
