// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Join protocol for relays and leaves
//!
//! 1. Register this node's endpoint with the directory and adopt the
//!    roster name and place it answers with.
//! 2. Resolve the superior's endpoint. The superior may not have started
//!    yet; that answer is retryable.
//! 3. Register with the superior. `AlreadyRegistered` means a previous
//!    attempt got through, so the node reads back its stored info instead.
//! 4. Converge on the directives the superior assigned, then start the
//!    uplink.
//!
//! Every remote step is retried under the node's [`RetryPolicy`].

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::backoff::retry_with_backoff;
use crate::application::endpoint::SubordinateEndpoint;
use crate::application::uplink::{spawn_uplink, UplinkError, UplinkSettings};
use crate::domain::directory::Resolution;
use crate::domain::error::{LinkError, TroopError};
use crate::domain::link::{DirectoryLink, SuperiorConnector, SuperiorLink};
use crate::domain::node::{NodeInfo, PollOutcome};
use crate::domain::retry::RetryPolicy;

/// A node that can join a superior.
#[async_trait]
pub trait Enlistable: SubordinateEndpoint {
    /// Take on the roster identity and the link to the superior.
    async fn adopt(&self, resolution: &Resolution, superior: Arc<dyn SuperiorLink>);

    fn shutdown_token(&self) -> CancellationToken;
}

pub struct JoinOutcome {
    pub resolution: Resolution,
    pub superior: Arc<dyn SuperiorLink>,
    /// The superior's copy of this node's info.
    pub accepted: NodeInfo,
}

/// Run steps 1-3 for `info`.
pub async fn join(
    directory: &dyn DirectoryLink,
    connector: &dyn SuperiorConnector,
    mut info: NodeInfo,
    policy: &RetryPolicy,
) -> Result<JoinOutcome, LinkError> {
    let resolution = retry_with_backoff(policy, "register_endpoint", || {
        directory.register_endpoint(&info.id, &info.endpoint)
    })
    .await?;
    info.name = resolution.name.clone();
    if resolution.place.is_some() {
        info.place = resolution.place.clone();
    }

    let superior_endpoint = retry_with_backoff(policy, "resolve_superior", || async {
        let current = directory.resolve(&info.id).await?;
        current.superior_endpoint.ok_or_else(|| {
            let superior = current
                .superior
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string());
            LinkError::Remote(TroopError::SuperiorUnavailable(superior))
        })
    })
    .await?;

    let superior = connector.connect(&superior_endpoint);
    info!(node_id = %info.id, superior = %superior_endpoint, "Registering with superior");

    let accepted = match retry_with_backoff(policy, "register", || superior.register(&info)).await {
        Ok(accepted) => accepted,
        Err(LinkError::Remote(TroopError::AlreadyRegistered(_))) => {
            info!(node_id = %info.id, "Already registered with superior; reading back stored info");
            match retry_with_backoff(policy, "poll_info", || superior.poll_info(&info.id, None)).await? {
                PollOutcome::Modified { info: stored, .. } => stored,
                PollOutcome::NotModified => info.clone(),
            }
        }
        Err(e) => return Err(e),
    };

    Ok(JoinOutcome {
        resolution,
        superior,
        accepted,
    })
}

/// Join `node` to its superior and start its uplink.
pub async fn enlist<N>(
    node: &Arc<N>,
    directory: &dyn DirectoryLink,
    connector: &dyn SuperiorConnector,
    policy: &RetryPolicy,
    uplink: UplinkSettings,
) -> Result<JoinHandle<Result<(), UplinkError>>, LinkError>
where
    N: Enlistable + 'static,
{
    let info = node.node_info().await;
    let outcome = join(directory, connector, info, policy).await?;

    node.adopt(&outcome.resolution, outcome.superior.clone()).await;
    let token = outcome.accepted.cache_token();
    node.sync_directives(outcome.accepted.directives.clone()).await;

    info!(
        node_id = %outcome.accepted.id,
        directives = outcome.accepted.directives.len(),
        "Joined superior"
    );

    let as_endpoint: Arc<dyn SubordinateEndpoint> = node.clone();
    let weak: Weak<dyn SubordinateEndpoint> = Arc::downgrade(&as_endpoint);
    Ok(spawn_uplink(
        weak,
        outcome.accepted.id.clone(),
        outcome.superior,
        uplink,
        Some(token),
        node.shutdown_token().child_token(),
    ))
}
