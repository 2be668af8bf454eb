// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Relay Node - mission owner, leaf supervisor and work rollup
//!
//! A relay receives Missions from the root, fans each one out into Orders
//! for its leaves, buffers the Work the leaves push, and on every Mission
//! timer tick drains the Work for that purpose into one Report sent upward.
//!
//! Each active Mission stores the cancellation token of its rollup task.
//! Superseding or removing a Mission cancels the token under the state lock,
//! and a tick re-checks the token under the same lock before draining, so no
//! rollup runs for a Mission that is no longer in the table.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Relay tier of the troop tree

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatch::{fan_out, retract, Dispatch};
use crate::application::endpoint::{SubordinateEndpoint, SuperiorEndpoint, TroopNode};
use crate::application::join::Enlistable;
use crate::application::liveness::LivenessMonitor;
use crate::application::membership::Membership;
use crate::application::root::check_role;
use crate::application::schedule::spawn_periodic;
use crate::application::work_buffer::WorkBuffer;
use crate::domain::directive::{Directive, Mission};
use crate::domain::directory::Resolution;
use crate::domain::error::TroopError;
use crate::domain::events::TroopEvent;
use crate::domain::link::{SubordinateLink, SuperiorLink};
use crate::domain::node::{CacheToken, NodeId, NodeIdentity, NodeInfo, NodeRole, PollOutcome};
use crate::domain::work::{Report, Work};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::metrics;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Eviction deadline for leaves.
    pub deadline: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(180),
        }
    }
}

pub struct RelayServices {
    /// Present when Orders are pushed to leaves; leaves poll otherwise.
    pub downlink: Option<Arc<dyn SubordinateLink>>,
    pub events: EventBus,
}

struct ActiveMission {
    mission: Mission,
    cancel: CancellationToken,
}

struct RelayState {
    identity: NodeIdentity,
    superior: Option<Arc<dyn SuperiorLink>>,
    members: Membership,
    missions: BTreeMap<String, ActiveMission>,
    buffer: WorkBuffer,
}

pub struct RelayNode {
    id: NodeId,
    services: RelayServices,
    state: Mutex<RelayState>,
    liveness: LivenessMonitor,
    shutdown: CancellationToken,
    self_ref: Weak<RelayNode>,
}

impl RelayNode {
    pub fn new(identity: NodeIdentity, settings: RelaySettings, services: RelayServices) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        Arc::new_cyclic(|self_ref| Self {
            id: identity.id.clone(),
            liveness: LivenessMonitor::new(settings.deadline, shutdown.child_token()),
            services,
            state: Mutex::new(RelayState {
                identity,
                superior: None,
                members: Membership::new(),
                missions: BTreeMap::new(),
                buffer: WorkBuffer::new(),
            }),
            shutdown,
            self_ref: self_ref.clone(),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    pub async fn identity(&self) -> NodeIdentity {
        self.state.lock().await.identity.clone()
    }

    /// Install a Mission, superseding the one with the same purpose.
    ///
    /// The superseded Mission's rollup task is cancelled and its Orders are
    /// retracted, but Work already buffered for the purpose is kept and goes
    /// into the new Mission's first Report. Re-delivery of an identical
    /// Mission is a no-op.
    pub async fn accept_mission(&self, mission: Mission) -> Result<(), TroopError> {
        if mission.author != self.id {
            return Err(TroopError::InvalidDirective(format!(
                "mission for '{}' delivered to '{}'",
                mission.author, self.id
            )));
        }
        if mission.purpose.is_empty() {
            return Err(TroopError::InvalidDirective("purpose cannot be empty".to_string()));
        }
        mission.trigger.validate()?;
        let purpose = mission.purpose.clone();

        let (dispatch, targets, replaced) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            if let Some(active) = state.missions.get(&purpose) {
                if active.mission == mission {
                    return Ok(());
                }
            }

            let mut dispatch = Dispatch::default();
            let replaced = match state.missions.remove(&purpose) {
                Some(old) => {
                    old.cancel.cancel();
                    dispatch.absorb(retract(&mut state.members, &purpose));
                    true
                }
                None => false,
            };

            let (fan, targets) = fan_out(&self.id, &mut state.members, &mission.place, |target| {
                Directive::Order(mission.derive_order(target))
            });
            dispatch.absorb(fan);

            let cancel = self.shutdown.child_token();
            self.start_rollup(&mission, cancel.clone());
            state.missions.insert(
                purpose.clone(),
                ActiveMission {
                    mission: mission.clone(),
                    cancel,
                },
            );
            (dispatch, targets, replaced)
        };

        info!(node_id = %self.id, purpose = %purpose, targets, replaced, "Mission accepted");
        self.services.events.publish(TroopEvent::MissionAccepted {
            node_id: self.id.clone(),
            purpose,
            targets,
            accepted_at: Utc::now(),
        });

        dispatch.send(&self.id, self.services.downlink.as_ref()).await;
        Ok(())
    }

    /// Remove a Mission, its Orders and its buffered Work.
    pub async fn remove_mission(&self, purpose: &str) -> Result<(), TroopError> {
        let (dispatch, discarded) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(active) = state.missions.remove(purpose) else {
                return Err(TroopError::NotFound(purpose.to_string()));
            };
            active.cancel.cancel();
            let discarded = state.buffer.discard_purpose(purpose);
            (retract(&mut state.members, purpose), discarded)
        };

        info!(node_id = %self.id, purpose = %purpose, discarded_work = discarded, "Mission removed");
        self.services.events.publish(TroopEvent::MissionRemoved {
            node_id: self.id.clone(),
            purpose: purpose.to_string(),
            removed_at: Utc::now(),
        });

        dispatch.send(&self.id, self.services.downlink.as_ref()).await;
        Ok(())
    }

    pub async fn missions(&self) -> Vec<Mission> {
        self.state
            .lock()
            .await
            .missions
            .values()
            .map(|active| active.mission.clone())
            .collect()
    }

    /// Work received but not yet rolled into a Report.
    pub async fn buffered_work(&self) -> Vec<Work> {
        self.state.lock().await.buffer.snapshot()
    }

    pub async fn subordinate(&self, id: &NodeId) -> Option<NodeInfo> {
        self.state.lock().await.members.get(id).cloned()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every rollup task and watcher.
    pub fn shutdown(&self) {
        info!(node_id = %self.id, "Shutting down relay node");
        self.shutdown.cancel();
        self.liveness.shutdown();
    }

    fn start_rollup(&self, mission: &Mission, cancel: CancellationToken) {
        let Some(period) = mission.trigger.period() else {
            debug!(node_id = %self.id, purpose = %mission.purpose, "Mission has no timer; no rollup scheduled");
            return;
        };
        let weak = self.self_ref.clone();
        let purpose = mission.purpose.clone();
        let tick_cancel = cancel.clone();
        spawn_periodic(period, cancel, move || {
            let weak = weak.clone();
            let purpose = purpose.clone();
            let cancel = tick_cancel.clone();
            async move {
                if let Some(relay) = weak.upgrade() {
                    relay.rollup(&purpose, &cancel).await;
                }
            }
        });
    }

    /// Drain the buffer for `purpose` into one Report and send it upward.
    /// A failed send drops the Report.
    async fn rollup(&self, purpose: &str, cancel: &CancellationToken) {
        let (report, superior) = {
            let mut state = self.state.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            let values = state.buffer.drain_purpose(purpose);
            let report = Report {
                time: Utc::now(),
                purpose: purpose.to_string(),
                author: self.id.clone(),
                place: state.identity.place.clone(),
                values,
            };
            (report, state.superior.clone())
        };
        let work_items = report.values.len();

        let Some(superior) = superior else {
            warn!(node_id = %self.id, purpose = %purpose, work_items, "No superior attached; report dropped");
            metrics::record_report_dropped(NodeRole::Relay, purpose);
            return;
        };

        match superior.submit_report(&self.id, &report).await {
            Ok(()) => {
                debug!(node_id = %self.id, purpose = %purpose, work_items, "Report sent");
                metrics::record_report_forwarded(NodeRole::Relay, purpose);
                self.services.events.publish(TroopEvent::ReportForwarded {
                    node_id: self.id.clone(),
                    purpose: purpose.to_string(),
                    work_items,
                    forwarded_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(node_id = %self.id, purpose = %purpose, work_items, error = %e, "Report transmission failed; report dropped");
                metrics::record_report_dropped(NodeRole::Relay, purpose);
            }
        }
    }

    fn watch(&self, id: &NodeId) {
        let weak = self.self_ref.clone();
        self.liveness.watch(id.clone(), move |id, generation| async move {
            if let Some(relay) = weak.upgrade() {
                relay.evict(id, generation).await;
            }
        });
    }

    async fn evict(&self, id: NodeId, generation: u64) {
        let (remaining, superior, place) = {
            let mut state = self.state.lock().await;
            if !self.liveness.retire(&id, generation) {
                return;
            }
            state.members.remove(&id);
            (state.members.len(), state.superior.clone(), state.identity.place.clone())
        };

        let deadline = self.liveness.deadline().as_secs();
        warn!(node_id = %self.id, subordinate_id = %id, deadline_secs = deadline, "Leaf evicted");
        metrics::record_eviction(NodeRole::Relay, remaining);
        self.services.events.publish(TroopEvent::SubordinateEvicted {
            node_id: self.id.clone(),
            subordinate_id: id.clone(),
            evicted_at: Utc::now(),
        });

        if let Some(superior) = superior {
            let notice = Report::error_notice(
                self.id.clone(),
                place,
                format!("leaf {} evicted: no liveness signal within {}s", id, deadline),
            );
            if let Err(e) = superior.submit_report(&self.id, &notice).await {
                warn!(node_id = %self.id, error = %e, "Failed to report leaf eviction upward");
            }
        }
    }
}

#[async_trait]
impl TroopNode for RelayNode {
    fn node_id(&self) -> &NodeId {
        &self.id
    }

    async fn node_info(&self) -> NodeInfo {
        let state = self.state.lock().await;
        let mut info = state.identity.to_info();
        info.subordinates = state.members.ids().into_iter().collect();
        info.directives = state
            .missions
            .values()
            .map(|active| Directive::Mission(active.mission.clone()))
            .collect();
        info
    }
}

#[async_trait]
impl SuperiorEndpoint for RelayNode {
    async fn list_subordinates(&self) -> Vec<NodeInfo> {
        self.state.lock().await.members.list()
    }

    async fn register(&self, info: NodeInfo) -> Result<NodeInfo, TroopError> {
        let identity = self.identity().await;
        check_role(&identity, &info)?;
        let id = info.id.clone();

        let (stored, members) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.members.insert(info)?;
            for active in state.missions.values() {
                if active.mission.place.matches(&id) {
                    state
                        .members
                        .assign(&id, Directive::Order(active.mission.derive_order(&id)));
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

        info!(node_id = %self.id, subordinate_id = %id, orders = stored.directives.len(), "Leaf registered");
        metrics::record_join(NodeRole::Relay, members);
        self.services.events.publish(TroopEvent::SubordinateJoined {
            node_id: self.id.clone(),
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

    async fn submit_work(&self, id: &NodeId, work: Work) -> Result<(), TroopError> {
        let purpose = work.purpose.clone();
        {
            let mut state = self.state.lock().await;
            if !state.members.contains(id) {
                return Err(TroopError::UnknownSubordinate(id.to_string()));
            }
            if !state.missions.contains_key(&purpose) {
                warn!(node_id = %self.id, leaf_id = %id, purpose = %purpose, "Work for no active mission discarded");
                return Ok(());
            }
            state.buffer.push(work);
        }
        debug!(node_id = %self.id, leaf_id = %id, purpose = %purpose, "Work buffered");
        metrics::record_work_accepted(&purpose);
        Ok(())
    }
}

#[async_trait]
impl SubordinateEndpoint for RelayNode {
    async fn accept_directive(&self, directive: Directive) -> Result<(), TroopError> {
        match directive {
            Directive::Mission(mission) => self.accept_mission(mission).await,
            other => Err(TroopError::InvalidDirective(format!(
                "relay '{}' accepts missions, not {}s",
                self.id,
                other.kind()
            ))),
        }
    }

    async fn withdraw_directive(&self, purpose: &str) -> Result<(), TroopError> {
        self.remove_mission(purpose).await
    }

    async fn active_purposes(&self) -> BTreeSet<String> {
        self.state.lock().await.missions.keys().cloned().collect()
    }
}

#[async_trait]
impl Enlistable for RelayNode {
    async fn adopt(&self, resolution: &Resolution, superior: Arc<dyn SuperiorLink>) {
        let mut state = self.state.lock().await;
        state.identity.name = resolution.name.clone();
        if resolution.place.is_some() {
            state.identity.place = resolution.place.clone();
        }
        state.superior = Some(superior);
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directive::{Placement, Trigger};
    use crate::domain::error::LinkError;
    use crate::domain::work::Reading;
    use parking_lot::Mutex as SyncMutex;

    #[derive(Default)]
    struct CollectingSuperior {
        reports: SyncMutex<Vec<Report>>,
    }

    #[async_trait]
    impl SuperiorLink for CollectingSuperior {
        async fn register(&self, info: &NodeInfo) -> Result<NodeInfo, LinkError> {
            Ok(info.clone())
        }
        async fn heartbeat(&self, _id: &NodeId) -> Result<(), LinkError> {
            Ok(())
        }
        async fn poll_info(&self, _id: &NodeId, _token: Option<&CacheToken>) -> Result<PollOutcome, LinkError> {
            Ok(PollOutcome::NotModified)
        }
        async fn submit_work(&self, _id: &NodeId, _work: &Work) -> Result<(), LinkError> {
            Ok(())
        }
        async fn submit_report(&self, _id: &NodeId, report: &Report) -> Result<(), LinkError> {
            self.reports.lock().push(report.clone());
            Ok(())
        }
    }

    fn resolution() -> Resolution {
        Resolution {
            id: NodeId::new("r1"),
            name: "leader".to_string(),
            role: NodeRole::Relay,
            place: Some("floor1".to_string()),
            endpoint: Some("http://r1/".to_string()),
            superior: Some(NodeId::new("c1")),
            superior_endpoint: Some("http://c1/".to_string()),
            children: Default::default(),
        }
    }

    async fn relay_with_leaf() -> (Arc<RelayNode>, Arc<CollectingSuperior>) {
        let relay = RelayNode::new(
            NodeIdentity::new("r1", "leader", NodeRole::Relay, "http://r1/"),
            RelaySettings::default(),
            RelayServices {
                downlink: None,
                events: EventBus::new(16),
            },
        );
        let superior = Arc::new(CollectingSuperior::default());
        relay.adopt(&resolution(), superior.clone()).await;
        relay
            .register(NodeIdentity::new("l1", "sensortag", NodeRole::Leaf, "http://l1/").to_info())
            .await
            .unwrap();
        (relay, superior)
    }

    fn mission(purpose: &str, timer: u64) -> Mission {
        Mission {
            author: NodeId::new("r1"),
            place: Placement::All,
            purpose: purpose.to_string(),
            requirements: ["temperature".to_string()].into_iter().collect(),
            trigger: Trigger::timer(timer),
        }
    }

    fn work(purpose: &str, celsius: f64) -> Work {
        let mut values = BTreeMap::new();
        values.insert("temperature".to_string(), Reading::new(celsius, "degC"));
        Work {
            time: Utc::now(),
            purpose: purpose.to_string(),
            author: NodeId::new("l1"),
            place: Some("room1".to_string()),
            values,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_mission_keeps_buffered_work() {
        let (relay, superior) = relay_with_leaf().await;
        let l1 = NodeId::new("l1");

        relay.accept_mission(mission("p1", 60)).await.unwrap();
        relay.submit_work(&l1, work("p1", 20.5)).await.unwrap();
        let buffered = relay.buffered_work().await;
        relay.accept_mission(mission("p1", 10)).await.unwrap();
        assert_eq!(relay.missions().await[0].trigger, Trigger::timer(10));
        assert_eq!(relay.buffered_work().await, buffered);
        assert_eq!(buffered.len(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let reports = superior.reports.lock().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].purpose, "p1");
        assert_eq!(reports[0].values, buffered);
        assert!(relay.buffered_work().await.is_empty());

        let stored = relay.subordinate(&l1).await.unwrap();
        assert_eq!(stored.directives.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_mission_discards_work_and_stops_rollup() {
        let (relay, superior) = relay_with_leaf().await;
        let l1 = NodeId::new("l1");

        relay.accept_mission(mission("p1", 10)).await.unwrap();
        relay.submit_work(&l1, work("p1", 19.0)).await.unwrap();
        relay.remove_mission("p1").await.unwrap();
        assert!(relay.buffered_work().await.is_empty());
        assert!(relay.missions().await.is_empty());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(superior.reports.lock().is_empty());
        assert!(relay.subordinate(&l1).await.unwrap().directives.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_timer_rejected() {
        let (relay, _superior) = relay_with_leaf().await;
        let err = relay.accept_mission(mission("p1", u64::MAX / 2)).await.unwrap_err();
        assert!(matches!(err, TroopError::InvalidDirective(_)));
        assert!(relay.missions().await.is_empty());
    }
}
