// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Uplink - the liveness signal a subordinate sends its superior
//!
//! One task per joined relay or leaf. In heartbeat mode it calls
//! `heartbeat` every interval. In poll mode it issues a conditional
//! `poll_info` with the last cache token and, when the superior's copy has
//! changed, converges the node's directives on it; this is how Missions and
//! Orders reach a subordinate when the superior does not push them.
//!
//! Transport failures are retried with backoff. Retry exhaustion, or the
//! superior reporting the node as unknown (it was evicted), ends the task
//! with an [`UplinkError`] that the process surfaces to its operator.

use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::application::backoff::retry_with_backoff;
use crate::application::endpoint::SubordinateEndpoint;
use crate::domain::error::{LinkError, TroopError};
use crate::domain::link::SuperiorLink;
use crate::domain::node::{CacheToken, NodeId, PollOutcome};
use crate::domain::node_config::LivenessMode;
use crate::domain::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct UplinkSettings {
    pub mode: LivenessMode,
    pub interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for UplinkSettings {
    fn default() -> Self {
        Self {
            mode: LivenessMode::Heartbeat,
            interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum UplinkError {
    #[error("node '{0}' is no longer registered with its superior")]
    Evicted(NodeId),

    #[error("superior unreachable: {0}")]
    Unreachable(LinkError),
}

impl UplinkError {
    fn from_link(id: &NodeId, err: LinkError) -> Self {
        match err {
            LinkError::Remote(TroopError::UnknownSubordinate(_)) => UplinkError::Evicted(id.clone()),
            other => UplinkError::Unreachable(other),
        }
    }
}

/// Spawn the uplink for `node`. `token` is the cache token of the info the
/// superior accepted at registration.
pub fn spawn_uplink(
    node: Weak<dyn SubordinateEndpoint>,
    node_id: NodeId,
    link: Arc<dyn SuperiorLink>,
    settings: UplinkSettings,
    token: Option<CacheToken>,
    cancel: CancellationToken,
) -> JoinHandle<Result<(), UplinkError>> {
    tokio::spawn(async move {
        info!(node_id = %node_id, mode = ?settings.mode, interval_secs = settings.interval.as_secs(), "Uplink started");
        let mut token = token;
        let mut ticker = interval_at(Instant::now() + settings.interval, settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(node_id = %node_id, "Uplink stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let result = match settings.mode {
                LivenessMode::Heartbeat => heartbeat(&node_id, &link, &settings.retry).await,
                LivenessMode::Poll => poll(&node, &node_id, &link, &settings.retry, &mut token).await,
            };
            if let Err(e) = result {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                error!(node_id = %node_id, error = %e, "Uplink terminated");
                return Err(e);
            }
        }
    })
}

async fn heartbeat(node_id: &NodeId, link: &Arc<dyn SuperiorLink>, retry: &RetryPolicy) -> Result<(), UplinkError> {
    retry_with_backoff(retry, "heartbeat", || link.heartbeat(node_id))
        .await
        .map_err(|e| UplinkError::from_link(node_id, e))?;
    debug!(node_id = %node_id, "Heartbeat sent");
    Ok(())
}

async fn poll(
    node: &Weak<dyn SubordinateEndpoint>,
    node_id: &NodeId,
    link: &Arc<dyn SuperiorLink>,
    retry: &RetryPolicy,
    token: &mut Option<CacheToken>,
) -> Result<(), UplinkError> {
    let current = token.clone();
    let outcome = retry_with_backoff(retry, "poll_info", || link.poll_info(node_id, current.as_ref()))
        .await
        .map_err(|e| UplinkError::from_link(node_id, e))?;

    match outcome {
        PollOutcome::NotModified => debug!(node_id = %node_id, "Superior copy not modified"),
        PollOutcome::Modified { info, token: fresh } => {
            info!(node_id = %node_id, directives = info.directives.len(), "Superior copy changed; syncing directives");
            if let Some(node) = node.upgrade() {
                node.sync_directives(info.directives).await;
            }
            *token = Some(fresh);
        }
    }
    Ok(())
}
