// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directive fan-out over a membership table, and the push traffic it
//! implies.
//!
//! Fan-out mutates the table while the owning node holds its state lock and
//! returns a [`Dispatch`]; the node sends the dispatch after releasing the
//! lock so that no remote call happens under it.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::membership::Membership;
use crate::domain::directive::{Directive, Placement};
use crate::domain::link::SubordinateLink;
use crate::domain::node::NodeId;

#[derive(Debug, Default)]
pub struct Dispatch {
    deliveries: Vec<(NodeId, String, Directive)>,
    withdrawals: Vec<(NodeId, String, String)>,
}

impl Dispatch {
    /// Append `later`'s traffic after this one's.
    pub fn absorb(&mut self, later: Dispatch) {
        self.deliveries.extend(later.deliveries);
        self.withdrawals.extend(later.withdrawals);
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.withdrawals.is_empty()
    }

    /// Transmit over `downlink`. Withdrawals go first, except those made
    /// redundant by a delivery of the same purpose to the same target.
    /// Failures are logged; the table already holds the truth for a later
    /// poll.
    pub async fn send(self, node_id: &NodeId, downlink: Option<&Arc<dyn SubordinateLink>>) {
        let Some(downlink) = downlink else {
            return;
        };

        let superseded: HashSet<(&NodeId, &str)> = self
            .deliveries
            .iter()
            .map(|(id, _, d)| (id, d.purpose()))
            .collect();

        for (target, endpoint, purpose) in &self.withdrawals {
            if superseded.contains(&(target, purpose.as_str())) {
                continue;
            }
            if let Err(e) = downlink.withdraw(endpoint, purpose).await {
                warn!(node_id = %node_id, target = %target, purpose = %purpose, error = %e, "Failed to withdraw directive");
            }
        }

        for (target, endpoint, directive) in &self.deliveries {
            match downlink.deliver(endpoint, directive).await {
                Ok(()) => debug!(node_id = %node_id, target = %target, purpose = %directive.purpose(), "Directive delivered"),
                Err(e) => warn!(
                    node_id = %node_id,
                    target = %target,
                    purpose = %directive.purpose(),
                    error = %e,
                    "Failed to deliver directive"
                ),
            }
        }
    }
}

/// Derive one directive per placement target and assign it. A named target
/// that is not a member yields no directive. Returns the traffic and the
/// number of targets.
pub fn fan_out<F>(node_id: &NodeId, members: &mut Membership, place: &Placement, derive: F) -> (Dispatch, usize)
where
    F: Fn(&NodeId) -> Directive,
{
    let ids = members.ids();
    let targets = match place.select(&ids) {
        Ok(targets) => targets,
        Err(e) => {
            warn!(node_id = %node_id, error = %e, "No directive derived for placement");
            Vec::new()
        }
    };

    let mut dispatch = Dispatch::default();
    let mut assigned = 0;
    for target in targets {
        let directive = derive(&target);
        if !members.assign(&target, directive.clone()) {
            continue;
        }
        assigned += 1;
        if let Some(endpoint) = members.endpoint(&target) {
            dispatch.deliveries.push((target, endpoint, directive));
        }
    }
    (dispatch, assigned)
}

/// Remove every directive with `purpose` from the table.
pub fn retract(members: &mut Membership, purpose: &str) -> Dispatch {
    let mut dispatch = Dispatch::default();
    for target in members.retract(purpose) {
        if let Some(endpoint) = members.endpoint(&target) {
            dispatch.withdrawals.push((target, endpoint, purpose.to_string()));
        }
    }
    dispatch
}

/// Traffic for one directive given to one subordinate.
pub fn single_delivery(target: NodeId, endpoint: String, directive: Directive) -> Dispatch {
    Dispatch {
        deliveries: vec![(target, endpoint, directive)],
        withdrawals: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directive::{Order, Trigger};
    use crate::domain::error::LinkError;
    use crate::domain::node::{NodeIdentity, NodeRole};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingLink {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubordinateLink for RecordingLink {
        async fn deliver(&self, endpoint: &str, directive: &Directive) -> Result<(), LinkError> {
            self.calls.lock().push(format!("deliver {} {}", endpoint, directive.purpose()));
            Ok(())
        }

        async fn withdraw(&self, endpoint: &str, purpose: &str) -> Result<(), LinkError> {
            self.calls.lock().push(format!("withdraw {} {}", endpoint, purpose));
            Ok(())
        }
    }

    fn members(ids: &[&str]) -> Membership {
        let mut members = Membership::new();
        for id in ids {
            members
                .insert(NodeIdentity::new(*id, "leaf", NodeRole::Leaf, *id).to_info())
                .unwrap();
        }
        members
    }

    fn order_for(purpose: &'static str) -> impl Fn(&NodeId) -> Directive {
        move |target| {
            Directive::Order(Order {
                author: target.clone(),
                purpose: purpose.to_string(),
                requirements: Default::default(),
                trigger: Trigger::timer(5),
            })
        }
    }

    #[test]
    fn test_fan_out_all_and_missing_target() {
        let node = NodeId::new("r1");
        let mut table = members(&["l1", "l2"]);

        let (_, count) = fan_out(&node, &mut table, &Placement::All, order_for("p1"));
        assert_eq!(count, 2);

        let (dispatch, count) = fan_out(&node, &mut table, &Placement::Node(NodeId::new("l9")), order_for("p2"));
        assert_eq!(count, 0);
        assert!(dispatch.is_empty());
    }

    #[tokio::test]
    async fn test_replacement_skips_redundant_withdraw() {
        let node = NodeId::new("r1");
        let mut table = members(&["l1", "l2"]);
        fan_out(&node, &mut table, &Placement::All, order_for("p1"));

        let mut dispatch = retract(&mut table, "p1");
        let (again, _) = fan_out(&node, &mut table, &Placement::Node(NodeId::new("l1")), order_for("p1"));
        dispatch.absorb(again);

        let link = Arc::new(RecordingLink::default());
        let downlink: Arc<dyn SubordinateLink> = link.clone();
        dispatch.send(&node, Some(&downlink)).await;

        let calls = link.calls.lock().clone();
        assert_eq!(calls, vec!["withdraw l2 p1".to_string(), "deliver l1 p1".to_string()]);
    }
}
