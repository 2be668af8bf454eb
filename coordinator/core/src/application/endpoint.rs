// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service traits exposed by running nodes.
//!
//! [`SuperiorEndpoint`] is what a root or relay offers its subordinates;
//! [`SubordinateEndpoint`] is what a relay or leaf offers its superior for
//! push delivery. Transport adapters (the axum routers, the in-process
//! network) bind to these traits rather than to concrete node types.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::warn;

use crate::domain::directive::Directive;
use crate::domain::error::TroopError;
use crate::domain::node::{CacheToken, NodeId, NodeInfo, PollOutcome};
use crate::domain::work::{Report, Work};

#[async_trait]
pub trait TroopNode: Send + Sync {
    fn node_id(&self) -> &NodeId;

    /// Current snapshot of this node's own info.
    async fn node_info(&self) -> NodeInfo;
}

#[async_trait]
pub trait SuperiorEndpoint: TroopNode {
    async fn list_subordinates(&self) -> Vec<NodeInfo>;
    async fn register(&self, info: NodeInfo) -> Result<NodeInfo, TroopError>;
    async fn heartbeat(&self, id: &NodeId) -> Result<(), TroopError>;
    async fn poll_info(&self, id: &NodeId, token: Option<&CacheToken>) -> Result<PollOutcome, TroopError>;

    async fn submit_work(&self, _id: &NodeId, _work: Work) -> Result<(), TroopError> {
        Err(TroopError::Unsupported("submit_work".to_string()))
    }

    async fn submit_report(&self, _id: &NodeId, _report: Report) -> Result<(), TroopError> {
        Err(TroopError::Unsupported("submit_report".to_string()))
    }
}

#[async_trait]
pub trait SubordinateEndpoint: TroopNode {
    /// Install or supersede the directive with the same purpose.
    async fn accept_directive(&self, directive: Directive) -> Result<(), TroopError>;

    /// Remove the directive with `purpose` and everything derived from it.
    async fn withdraw_directive(&self, purpose: &str) -> Result<(), TroopError>;

    /// Purposes of the directives currently installed.
    async fn active_purposes(&self) -> BTreeSet<String>;

    /// Converge on the directive list held by the superior: install new or
    /// changed entries and withdraw the ones that vanished.
    async fn sync_directives(&self, directives: Vec<Directive>) {
        let wanted: BTreeSet<String> = directives.iter().map(|d| d.purpose().to_string()).collect();

        for purpose in self.active_purposes().await {
            if wanted.contains(&purpose) {
                continue;
            }
            match self.withdraw_directive(&purpose).await {
                Ok(()) | Err(TroopError::NotFound(_)) => {}
                Err(e) => warn!(node_id = %self.node_id(), purpose = %purpose, error = %e, "Failed to withdraw directive"),
            }
        }

        for directive in directives {
            let purpose = directive.purpose().to_string();
            if let Err(e) = self.accept_directive(directive).await {
                warn!(node_id = %self.node_id(), purpose = %purpose, error = %e, "Failed to adopt directive");
            }
        }
    }
}
