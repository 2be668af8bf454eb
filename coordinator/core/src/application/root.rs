// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Root Node - campaign owner and report sink gateway
//!
//! The root holds the relay membership table and the active Campaigns.
//! Each Campaign fans out into one Mission per targeted relay; relays that
//! join later receive the Missions of every Campaign whose placement matches
//! them. Reports from relays are cached, flattened into sink records and
//! pushed to the sink named by the matching Campaign's `destination`.
//! `_error` reports go to the alert channel instead.
//!
//! All table mutation happens under one async mutex; remote calls (push
//! delivery, sink pushes, alerts) happen after it is released.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Root tier of the troop tree

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatch::{fan_out, retract, Dispatch};
use crate::application::endpoint::{SuperiorEndpoint, TroopNode};
use crate::application::liveness::LivenessMonitor;
use crate::application::membership::Membership;
use crate::domain::directive::{Campaign, Directive};
use crate::domain::error::TroopError;
use crate::domain::events::TroopEvent;
use crate::domain::link::SubordinateLink;
use crate::domain::node::{CacheToken, NodeId, NodeIdentity, NodeInfo, NodeRole, PollOutcome};
use crate::domain::sink::{AlertChannel, SinkResolver};
use crate::domain::work::{Report, ERROR_PURPOSE};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::metrics;

#[derive(Debug, Clone)]
pub struct RootSettings {
    /// Eviction deadline for relays.
    pub deadline: Duration,
    /// Reports kept for inspection.
    pub report_cache: usize,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(180),
            report_cache: 256,
        }
    }
}

/// External collaborators of a root node.
pub struct RootServices {
    /// Present when directives are pushed to relays; relays poll otherwise.
    pub downlink: Option<Arc<dyn SubordinateLink>>,
    pub sinks: Arc<dyn SinkResolver>,
    pub alerts: Arc<dyn AlertChannel>,
    pub events: EventBus,
}

#[derive(Default)]
struct RootState {
    members: Membership,
    campaigns: BTreeMap<String, Campaign>,
    reports: VecDeque<Report>,
}

pub struct RootNode {
    identity: NodeIdentity,
    settings: RootSettings,
    services: RootServices,
    state: Mutex<RootState>,
    liveness: LivenessMonitor,
    shutdown: CancellationToken,
    self_ref: Weak<RootNode>,
}

impl RootNode {
    pub fn new(identity: NodeIdentity, settings: RootSettings, services: RootServices) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        Arc::new_cyclic(|self_ref| Self {
            liveness: LivenessMonitor::new(settings.deadline, shutdown.child_token()),
            identity,
            settings,
            services,
            state: Mutex::new(RootState::default()),
            shutdown,
            self_ref: self_ref.clone(),
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    /// Accept a campaign, replacing any active one with the same purpose.
    ///
    /// The replaced campaign's Missions are retracted before the new fan-out
    /// so no relay ever holds two Missions with one purpose. A named
    /// placement that is not a current relay yields zero Missions.
    pub async fn submit_campaign(&self, campaign: Campaign) -> Result<Campaign, TroopError> {
        validate_purpose(&campaign.purpose)?;
        campaign.trigger.validate()?;
        let purpose = campaign.purpose.clone();

        let (dispatch, targets, replaced) = {
            let mut state = self.state.lock().await;
            let mut dispatch = Dispatch::default();
            let replaced = state.campaigns.remove(&purpose).is_some();
            if replaced {
                dispatch.absorb(retract(&mut state.members, &purpose));
            }
            let (fan, targets) = fan_out(&self.identity.id, &mut state.members, &campaign.place, |target| {
                Directive::Mission(campaign.derive_mission(target))
            });
            dispatch.absorb(fan);
            state.campaigns.insert(purpose.clone(), campaign.clone());
            (dispatch, targets, replaced)
        };

        info!(
            node_id = %self.identity.id,
            purpose = %purpose,
            targets,
            replaced,
            destination = %campaign.destination,
            "Campaign accepted"
        );
        self.services.events.publish(TroopEvent::CampaignAccepted {
            node_id: self.identity.id.clone(),
            purpose,
            targets,
            accepted_at: Utc::now(),
        });

        dispatch.send(&self.identity.id, self.services.downlink.as_ref()).await;
        Ok(campaign)
    }

    /// Delete a campaign and every Mission derived from it.
    pub async fn remove_campaign(&self, purpose: &str) -> Result<(), TroopError> {
        let dispatch = {
            let mut state = self.state.lock().await;
            if state.campaigns.remove(purpose).is_none() {
                return Err(TroopError::NotFound(purpose.to_string()));
            }
            retract(&mut state.members, purpose)
        };

        info!(node_id = %self.identity.id, purpose = %purpose, "Campaign removed");
        self.services.events.publish(TroopEvent::CampaignRemoved {
            node_id: self.identity.id.clone(),
            purpose: purpose.to_string(),
            removed_at: Utc::now(),
        });

        dispatch.send(&self.identity.id, self.services.downlink.as_ref()).await;
        Ok(())
    }

    pub async fn list_campaigns(&self) -> Vec<Campaign> {
        self.state.lock().await.campaigns.values().cloned().collect()
    }

    /// Cached reports, oldest first.
    pub async fn reports(&self) -> Vec<Report> {
        self.state.lock().await.reports.iter().cloned().collect()
    }

    pub async fn subordinate(&self, id: &NodeId) -> Option<NodeInfo> {
        self.state.lock().await.members.get(id).cloned()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every watcher. Membership is left as is.
    pub fn shutdown(&self) {
        info!(node_id = %self.identity.id, "Shutting down root node");
        self.shutdown.cancel();
        self.liveness.shutdown();
    }

    fn watch(&self, id: &NodeId) {
        let weak = self.self_ref.clone();
        self.liveness.watch(id.clone(), move |id, generation| async move {
            if let Some(root) = weak.upgrade() {
                root.evict(id, generation).await;
            }
        });
    }

    async fn evict(&self, id: NodeId, generation: u64) {
        let remaining = {
            let mut state = self.state.lock().await;
            if !self.liveness.retire(&id, generation) {
                return;
            }
            state.members.remove(&id);
            state.members.len()
        };

        let deadline = self.liveness.deadline().as_secs();
        warn!(node_id = %self.identity.id, subordinate_id = %id, deadline_secs = deadline, "Relay evicted");
        metrics::record_eviction(self.identity.role, remaining);
        self.services.events.publish(TroopEvent::SubordinateEvicted {
            node_id: self.identity.id.clone(),
            subordinate_id: id.clone(),
            evicted_at: Utc::now(),
        });
        self.services
            .alerts
            .notify(&format!("relay-{} evicted: no liveness signal within {}s", id, deadline))
            .await;
    }

    async fn forward_to_sink(&self, campaign: &Campaign, report: &Report) {
        let Some(sink) = self.services.sinks.resolve(&campaign.destination) else {
            debug!(
                node_id = %self.identity.id,
                purpose = %campaign.purpose,
                destination = %campaign.destination,
                "No sink for destination; report kept in cache only"
            );
            return;
        };

        let records = report.flatten(&campaign.purpose);
        let count = records.len();
        match sink.push(records).await {
            Ok(()) => {
                debug!(purpose = %campaign.purpose, records = count, "Report pushed to sink");
                metrics::record_report_forwarded(self.identity.role, &campaign.purpose);
                self.services.events.publish(TroopEvent::ReportForwarded {
                    node_id: self.identity.id.clone(),
                    purpose: campaign.purpose.clone(),
                    work_items: report.values.len(),
                    forwarded_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(
                    node_id = %self.identity.id,
                    purpose = %campaign.purpose,
                    destination = %campaign.destination,
                    error = %e,
                    "Sink push failed"
                );
                metrics::record_sink_failure(&campaign.destination);
            }
        }
    }
}

fn validate_purpose(purpose: &str) -> Result<(), TroopError> {
    if purpose.is_empty() {
        return Err(TroopError::InvalidDirective("purpose cannot be empty".to_string()));
    }
    if purpose == ERROR_PURPOSE {
        return Err(TroopError::InvalidDirective(format!("purpose '{}' is reserved", ERROR_PURPOSE)));
    }
    Ok(())
}

pub(crate) fn check_role(superior: &NodeIdentity, candidate: &NodeInfo) -> Result<(), TroopError> {
    if superior.role.subordinate_role() == Some(candidate.role) {
        Ok(())
    } else {
        Err(TroopError::Unsupported(format!(
            "{} '{}' cannot register with {} '{}'",
            candidate.role, candidate.id, superior.role, superior.id
        )))
    }
}

#[async_trait]
impl TroopNode for RootNode {
    fn node_id(&self) -> &NodeId {
        &self.identity.id
    }

    async fn node_info(&self) -> NodeInfo {
        let state = self.state.lock().await;
        let mut info = self.identity.to_info();
        info.subordinates = state.members.ids().into_iter().collect();
        info.directives = state.campaigns.values().cloned().map(Directive::Campaign).collect();
        info
    }
}

#[async_trait]
impl SuperiorEndpoint for RootNode {
    async fn list_subordinates(&self) -> Vec<NodeInfo> {
        self.state.lock().await.members.list()
    }

    async fn register(&self, info: NodeInfo) -> Result<NodeInfo, TroopError> {
        check_role(&self.identity, &info)?;
        let id = info.id.clone();

        let (stored, members) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.members.insert(info)?;
            for campaign in state.campaigns.values() {
                if campaign.place.matches(&id) {
                    state.members.assign(&id, Directive::Mission(campaign.derive_mission(&id)));
                }
            }
            self.watch(&id);
            let stored = state
                .members
                .get(&id)
                .cloned()
                .ok_or_else(|| TroopError::UnknownSubordinate(id.to_string()))?;
            (stored, state.members.len())
        };

        info!(
            node_id = %self.identity.id,
            subordinate_id = %id,
            missions = stored.directives.len(),
            "Relay registered"
        );
        metrics::record_join(NodeRole::Root, members);
        self.services.events.publish(TroopEvent::SubordinateJoined {
            node_id: self.identity.id.clone(),
            subordinate_id: id,
            joined_at: Utc::now(),
        });
        Ok(stored)
    }

    async fn heartbeat(&self, id: &NodeId) -> Result<(), TroopError> {
        self.liveness.signal(id)
    }

    async fn poll_info(&self, id: &NodeId, token: Option<&CacheToken>) -> Result<PollOutcome, TroopError> {
        let info = self
            .state
            .lock()
            .await
            .members
            .get(id)
            .cloned()
            .ok_or_else(|| TroopError::UnknownSubordinate(id.to_string()))?;
        self.liveness.signal(id)?;

        let current = info.cache_token();
        if token == Some(&current) {
            Ok(PollOutcome::NotModified)
        } else {
            Ok(PollOutcome::Modified { info, token: current })
        }
    }

    async fn submit_report(&self, id: &NodeId, report: Report) -> Result<(), TroopError> {
        let campaign = {
            let mut state = self.state.lock().await;
            if !state.members.contains(id) {
                return Err(TroopError::UnknownSubordinate(id.to_string()));
            }
            if report.is_error_notice() {
                None
            } else {
                while state.reports.len() >= self.settings.report_cache.max(1) {
                    state.reports.pop_front();
                }
                state.reports.push_back(report.clone());
                Some(state.campaigns.get(&report.purpose).cloned())
            }
        };

        let Some(campaign) = campaign else {
            let message = report.error_message().unwrap_or_default();
            warn!(node_id = %self.identity.id, relay_id = %id, message = %message, "Error report received");
            self.services
                .alerts
                .notify(&format!("relay-{}'s error: {}", id, message))
                .await;
            return Ok(());
        };

        debug!(
            node_id = %self.identity.id,
            relay_id = %id,
            purpose = %report.purpose,
            work_items = report.values.len(),
            "Report accepted"
        );
        self.services.events.publish(TroopEvent::ReportAccepted {
            node_id: self.identity.id.clone(),
            from: id.clone(),
            purpose: report.purpose.clone(),
            work_items: report.values.len(),
            accepted_at: Utc::now(),
        });

        match campaign {
            Some(campaign) => self.forward_to_sink(&campaign, &report).await,
            None => debug!(purpose = %report.purpose, "Report purpose matches no active campaign"),
        }
        Ok(())
    }
}
