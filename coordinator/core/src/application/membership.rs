// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Membership table held by a superior (root or relay).
//!
//! The table is the authoritative copy of each subordinate's [`NodeInfo`],
//! including the directives assigned to it. It is plain data; the owning
//! node serializes access to it.

use std::collections::BTreeMap;

use crate::domain::directive::Directive;
use crate::domain::error::TroopError;
use crate::domain::node::{NodeId, NodeInfo};

#[derive(Debug, Default)]
pub struct Membership {
    members: BTreeMap<NodeId, NodeInfo>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new subordinate. Directives carried by the candidate are
    /// discarded; only the superior assigns directives.
    pub fn insert(&mut self, mut info: NodeInfo) -> Result<(), TroopError> {
        if self.members.contains_key(&info.id) {
            return Err(TroopError::AlreadyRegistered(info.id.to_string()));
        }
        info.directives.clear();
        self.members.insert(info.id.clone(), info);
        Ok(())
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<NodeInfo> {
        self.members.remove(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeInfo> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains_key(id)
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.members.keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<NodeInfo> {
        self.members.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Give `directive` to `id`, replacing any entry with the same purpose.
    /// Returns false if `id` is not a member.
    pub fn assign(&mut self, id: &NodeId, directive: Directive) -> bool {
        let Some(info) = self.members.get_mut(id) else {
            return false;
        };
        info.directives.retain(|d| d.purpose() != directive.purpose());
        info.directives.push(directive);
        true
    }

    /// Remove every directive with `purpose` from every member. Returns the
    /// ids that held one.
    pub fn retract(&mut self, purpose: &str) -> Vec<NodeId> {
        let mut affected = Vec::new();
        for (id, info) in self.members.iter_mut() {
            let before = info.directives.len();
            info.directives.retain(|d| d.purpose() != purpose);
            if info.directives.len() != before {
                affected.push(id.clone());
            }
        }
        affected
    }

    pub fn endpoint(&self, id: &NodeId) -> Option<String> {
        self.members.get(id).map(|info| info.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directive::{Order, Trigger};
    use crate::domain::node::{NodeIdentity, NodeRole};

    fn leaf(id: &str) -> NodeInfo {
        NodeIdentity::new(id, "sensortag", NodeRole::Leaf, format!("http://{}/", id)).to_info()
    }

    fn order(target: &str, purpose: &str, timer: u64) -> Directive {
        Directive::Order(Order {
            author: NodeId::new(target),
            purpose: purpose.to_string(),
            requirements: Default::default(),
            trigger: Trigger::timer(timer),
        })
    }

    #[test]
    fn test_duplicate_insert_leaves_table_unchanged() {
        let mut members = Membership::new();
        members.insert(leaf("l1")).unwrap();
        members.assign(&NodeId::new("l1"), order("l1", "p1", 5));

        let mut again = leaf("l1");
        again.name = "impostor".to_string();
        assert_eq!(
            members.insert(again),
            Err(TroopError::AlreadyRegistered("l1".to_string()))
        );
        assert_eq!(members.len(), 1);
        let stored = members.get(&NodeId::new("l1")).unwrap();
        assert_eq!(stored.name, "sensortag");
        assert_eq!(stored.directives.len(), 1);
    }

    #[test]
    fn test_insert_drops_candidate_directives() {
        let mut members = Membership::new();
        let mut candidate = leaf("l1");
        candidate.directives.push(order("l1", "stale", 5));
        members.insert(candidate).unwrap();
        assert!(members.get(&NodeId::new("l1")).unwrap().directives.is_empty());
    }

    #[test]
    fn test_assign_replaces_same_purpose() {
        let mut members = Membership::new();
        members.insert(leaf("l1")).unwrap();
        let id = NodeId::new("l1");
        members.assign(&id, order("l1", "p1", 5));
        members.assign(&id, order("l1", "p1", 10));
        members.assign(&id, order("l1", "p2", 5));

        let info = members.get(&id).unwrap();
        assert_eq!(info.directives.len(), 2);
        match info.directive("p1") {
            Some(Directive::Order(o)) => assert_eq!(o.trigger.timer, Some(10)),
            other => panic!("unexpected directive: {:?}", other),
        }
        assert!(!members.assign(&NodeId::new("ghost"), order("ghost", "p1", 5)));
    }

    #[test]
    fn test_retract_reports_affected_members() {
        let mut members = Membership::new();
        members.insert(leaf("l1")).unwrap();
        members.insert(leaf("l2")).unwrap();
        members.assign(&NodeId::new("l1"), order("l1", "p1", 5));

        assert_eq!(members.retract("p1"), vec![NodeId::new("l1")]);
        assert!(members.retract("p1").is_empty());
    }
}
