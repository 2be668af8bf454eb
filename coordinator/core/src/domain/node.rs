// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Identity and Info
//!
//! Typed records describing a node of the troop tree:
//!
//! - [`NodeId`] — stable roster identifier (string newtype).
//! - [`NodeRole`] — Root / Relay / Leaf tier.
//! - [`NodeInfo`] — the membership record a subordinate registers with its
//!   superior. The superior's copy is authoritative; `directives` holds the
//!   Missions/Orders currently assigned to that subordinate.
//! - [`CacheToken`] — validity token for conditional `poll_info` reads.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::directive::{Campaign, Directive, Mission, Order};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Root,
    Relay,
    Leaf,
}

impl NodeRole {
    /// Role of the tier directly below this one, if any.
    pub fn subordinate_role(&self) -> Option<NodeRole> {
        match self {
            NodeRole::Root => Some(NodeRole::Relay),
            NodeRole::Relay => Some(NodeRole::Leaf),
            NodeRole::Leaf => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Root => "root",
            NodeRole::Relay => "relay",
            NodeRole::Leaf => "leaf",
        };
        f.write_str(s)
    }
}

/// Static identity of a running node: who it is and where it can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

impl NodeIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: NodeRole, endpoint: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            name: name.into(),
            role,
            endpoint: endpoint.into(),
            place: None,
        }
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    /// Label used when composing place paths (`relay.leaf`): the place tag,
    /// falling back to the node id.
    pub fn place_label(&self) -> String {
        self.place.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Bare info record for this identity, with no subordinates or directives.
    pub fn to_info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            endpoint: self.endpoint.clone(),
            place: self.place.clone(),
            subordinates: BTreeSet::new(),
            directives: Vec::new(),
        }
    }
}

/// Membership record exchanged between a subordinate and its superior.
///
/// `subordinates` is derived (reported by the node itself) and never
/// authoritative. Equality and the [`CacheToken`] are computed field by field
/// from the serialized form; no field is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub endpoint: String,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub subordinates: BTreeSet<NodeId>,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

impl NodeInfo {
    pub fn campaigns(&self) -> impl Iterator<Item = &Campaign> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Campaign(c) => Some(c),
            _ => None,
        })
    }

    pub fn missions(&self) -> impl Iterator<Item = &Mission> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Mission(m) => Some(m),
            _ => None,
        })
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Order(o) => Some(o),
            _ => None,
        })
    }

    pub fn directive(&self, purpose: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.purpose() == purpose)
    }

    /// Validity token over the canonical JSON encoding of this record.
    pub fn cache_token(&self) -> CacheToken {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(self) {
            Ok(encoded) => hasher.update(&encoded),
            Err(e) => tracing::error!(node_id = %self.id, error = %e, "Failed to encode node info for cache token"),
        }
        CacheToken(hex::encode(hasher.finalize()))
    }
}

/// Opaque token identifying one version of a [`NodeInfo`] (sent as `ETag`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheToken(pub String);

impl CacheToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer to a conditional `poll_info` read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    NotModified,
    Modified { info: NodeInfo, token: CacheToken },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directive::{Placement, Trigger};

    fn leaf_info() -> NodeInfo {
        NodeIdentity::new("l1", "leaf-one", NodeRole::Leaf, "http://10.0.0.3:53000/").to_info()
    }

    #[test]
    fn test_cache_token_is_stable_for_equal_info() {
        let a = leaf_info();
        let b = leaf_info();
        assert_eq!(a, b);
        assert_eq!(a.cache_token(), b.cache_token());
    }

    #[test]
    fn test_cache_token_is_sha256_hex() {
        let token = leaf_info().cache_token();
        assert_eq!(token.0.len(), 64);
        assert!(token.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cache_token_changes_when_directives_change() {
        let before = leaf_info();
        let mut after = before.clone();
        after.directives.push(Directive::Order(Order {
            author: NodeId::new("l1"),
            purpose: "p1".to_string(),
            requirements: ["temperature".to_string()].into_iter().collect(),
            trigger: Trigger::timer(5),
        }));
        assert_ne!(before.cache_token(), after.cache_token());
        assert_eq!(after.orders().count(), 1);
        assert!(after.directive("p1").is_some());
    }

    #[test]
    fn test_node_info_json_shape() {
        let mut info = NodeIdentity::new("r1", "relay", NodeRole::Relay, "http://r1/")
            .with_place("floor1")
            .to_info();
        info.directives.push(Directive::Mission(Mission {
            author: NodeId::new("r1"),
            place: Placement::All,
            purpose: "p1".to_string(),
            requirements: Default::default(),
            trigger: Trigger::timer(10),
        }));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["id"], "r1");
        assert_eq!(value["role"], "relay");
        assert_eq!(value["place"], "floor1");
        assert_eq!(value["directives"][0]["kind"], "mission");
        assert_eq!(value["directives"][0]["place"], "All");
    }

    #[test]
    fn test_subordinate_role() {
        assert_eq!(NodeRole::Root.subordinate_role(), Some(NodeRole::Relay));
        assert_eq!(NodeRole::Relay.subordinate_role(), Some(NodeRole::Leaf));
        assert_eq!(NodeRole::Leaf.subordinate_role(), None);
    }
}
