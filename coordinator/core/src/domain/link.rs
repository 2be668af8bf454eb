// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transport Ports
//!
//! Every cross-node interaction goes through one of these traits; a node
//! never holds a live handle to another node. The back reference from a
//! subordinate to its superior is only an endpoint string turned into a
//! [`SuperiorLink`] by a [`SuperiorConnector`].
//!
//! | Trait | Direction | Implementations |
//! |-------|-----------|-----------------|
//! | [`SuperiorLink`] | subordinate → superior | `InProcessNetwork`, `troops_sdk::HttpSuperiorLink` |
//! | [`SubordinateLink`] | superior → subordinate (push delivery) | `InProcessNetwork`, `troops_sdk::HttpSubordinateLink` |
//! | [`DirectoryLink`] | any → directory | `Directory`, `troops_sdk::HttpDirectoryClient` |

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::directive::Directive;
use crate::domain::directory::Resolution;
use crate::domain::error::LinkError;
use crate::domain::node::{CacheToken, NodeId, NodeInfo, PollOutcome};
use crate::domain::work::{Report, Work};

#[async_trait]
pub trait SuperiorLink: Send + Sync {
    async fn register(&self, info: &NodeInfo) -> Result<NodeInfo, LinkError>;
    async fn heartbeat(&self, id: &NodeId) -> Result<(), LinkError>;
    async fn poll_info(&self, id: &NodeId, token: Option<&CacheToken>) -> Result<PollOutcome, LinkError>;
    async fn submit_work(&self, id: &NodeId, work: &Work) -> Result<(), LinkError>;
    async fn submit_report(&self, id: &NodeId, report: &Report) -> Result<(), LinkError>;
}

/// Turns a superior's endpoint string into a callable link.
pub trait SuperiorConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Arc<dyn SuperiorLink>;
}

#[async_trait]
pub trait SubordinateLink: Send + Sync {
    async fn deliver(&self, endpoint: &str, directive: &Directive) -> Result<(), LinkError>;
    async fn withdraw(&self, endpoint: &str, purpose: &str) -> Result<(), LinkError>;
}

#[async_trait]
pub trait DirectoryLink: Send + Sync {
    async fn resolve(&self, id: &NodeId) -> Result<Resolution, LinkError>;
    async fn register_endpoint(&self, id: &NodeId, endpoint: &str) -> Result<Resolution, LinkError>;
    async fn deregister(&self, id: &NodeId) -> Result<(), LinkError>;
}
