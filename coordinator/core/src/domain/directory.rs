// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Roster and Directory Types
//!
//! The static roster is a three-tier YAML tree:
//!
//! ```yaml
//! troops:
//!   - id: c1
//!     name: commander
//!     place: tokyo
//!     subs:
//!       - id: r1
//!         name: leader
//!         place: floor1
//!         subs:
//!           - id: l1
//!             name: sensortag
//!             place: room1
//! ```
//!
//! [`Roster::positions`] flattens it into per-id [`RosterPosition`]s and
//! enforces tree-wide id uniqueness.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::domain::node::{NodeId, NodeRole};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subs: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub troops: Vec<RosterEntry>,
}

/// Where one id sits in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterPosition {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub place: Option<String>,
    pub superior: Option<NodeId>,
    pub children: BTreeSet<NodeId>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("node not found in roster: {0}")]
    NotFound(String),

    #[error("duplicate node id in roster: {0}")]
    DuplicateId(String),

    #[error("invalid roster: {0}")]
    Roster(String),
}

impl Roster {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DirectoryError> {
        serde_yaml::from_str(yaml).map_err(|e| DirectoryError::Roster(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError::Roster(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    /// Flatten the tree, rejecting duplicate ids and trees deeper than
    /// root/relay/leaf.
    pub fn positions(&self) -> Result<HashMap<NodeId, RosterPosition>, DirectoryError> {
        let mut out = HashMap::new();
        for root in &self.troops {
            Self::collect(root, None, 0, &mut out)?;
        }
        Ok(out)
    }

    fn collect(
        entry: &RosterEntry,
        superior: Option<&NodeId>,
        depth: usize,
        out: &mut HashMap<NodeId, RosterPosition>,
    ) -> Result<(), DirectoryError> {
        let role = match depth {
            0 => NodeRole::Root,
            1 => NodeRole::Relay,
            2 => NodeRole::Leaf,
            _ => {
                return Err(DirectoryError::Roster(format!(
                    "node '{}' is nested deeper than the leaf tier",
                    entry.id
                )))
            }
        };
        if entry.id.is_empty() {
            return Err(DirectoryError::Roster("empty node id".to_string()));
        }

        let id = NodeId::new(entry.id.clone());
        if out.contains_key(&id) {
            return Err(DirectoryError::DuplicateId(entry.id.clone()));
        }
        out.insert(
            id.clone(),
            RosterPosition {
                id: id.clone(),
                name: entry.name.clone(),
                role,
                place: entry.place.clone(),
                superior: superior.cloned(),
                children: entry.subs.iter().map(|s| NodeId::new(s.id.clone())).collect(),
            },
        );

        for sub in &entry.subs {
            Self::collect(sub, Some(&id), depth + 1, out)?;
        }
        Ok(())
    }
}

/// Answer to `resolve(node_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    #[serde(default)]
    pub place: Option<String>,
    /// Endpoint the node registered, if it is running.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub superior: Option<NodeId>,
    /// `None` while the superior has not registered an endpoint.
    #[serde(default)]
    pub superior_endpoint: Option<String>,
    #[serde(default)]
    pub children: BTreeSet<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
troops:
  - id: c1
    name: commander
    place: tokyo
    subs:
      - id: r1
        name: leader
        place: floor1
        subs:
          - id: l1
            name: sensortag
            place: room1
          - id: l2
            name: sensortag
      - id: r2
        name: leader
"#;

    #[test]
    fn test_positions_assign_roles_and_links() {
        let roster = Roster::from_yaml_str(ROSTER).unwrap();
        let positions = roster.positions().unwrap();
        assert_eq!(positions.len(), 5);

        let c1 = &positions[&NodeId::new("c1")];
        assert_eq!(c1.role, NodeRole::Root);
        assert!(c1.superior.is_none());
        assert_eq!(c1.children.len(), 2);

        let l1 = &positions[&NodeId::new("l1")];
        assert_eq!(l1.role, NodeRole::Leaf);
        assert_eq!(l1.superior, Some(NodeId::new("r1")));
        assert_eq!(l1.place.as_deref(), Some("room1"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
troops:
  - id: c1
    name: commander
    subs:
      - id: x
        name: leader
        subs:
          - id: x
            name: sensortag
"#;
        let roster = Roster::from_yaml_str(yaml).unwrap();
        assert!(matches!(roster.positions(), Err(DirectoryError::DuplicateId(id)) if id == "x"));
    }

    #[test]
    fn test_too_deep_rejected() {
        let yaml = r#"
troops:
  - id: a
    name: a
    subs:
      - id: b
        name: b
        subs:
          - id: c
            name: c
            subs:
              - id: d
                name: d
"#;
        let roster = Roster::from_yaml_str(yaml).unwrap();
        assert!(matches!(roster.positions(), Err(DirectoryError::Roster(_))));
    }
}
