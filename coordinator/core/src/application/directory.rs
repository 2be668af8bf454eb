// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Directory - roster positions plus the endpoints of running nodes
//!
//! Positions come from the static roster and never change. Endpoints are
//! registered by nodes as they start and removed when they stop.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use crate::domain::directory::{DirectoryError, Roster, RosterPosition, Resolution};
use crate::domain::error::{LinkError, TroopError};
use crate::domain::link::DirectoryLink;
use crate::domain::node::NodeId;

pub struct Directory {
    positions: HashMap<NodeId, RosterPosition>,
    endpoints: RwLock<HashMap<NodeId, String>>,
}

impl Directory {
    pub fn from_roster(roster: &Roster) -> Result<Self, DirectoryError> {
        let positions = roster.positions()?;
        info!(nodes = positions.len(), "Directory loaded roster");
        Ok(Self {
            positions,
            endpoints: RwLock::new(HashMap::new()),
        })
    }

    pub fn resolve(&self, id: &NodeId) -> Result<Resolution, DirectoryError> {
        let position = self
            .positions
            .get(id)
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        let endpoints = self.endpoints.read();
        Ok(Resolution {
            id: position.id.clone(),
            name: position.name.clone(),
            role: position.role,
            place: position.place.clone(),
            endpoint: endpoints.get(id).cloned(),
            superior: position.superior.clone(),
            superior_endpoint: position
                .superior
                .as_ref()
                .and_then(|superior| endpoints.get(superior).cloned()),
            children: position.children.clone(),
        })
    }

    /// Record where `id` can be reached, replacing any previous endpoint.
    pub fn register_endpoint(&self, id: &NodeId, endpoint: &str) -> Result<Resolution, DirectoryError> {
        if !self.positions.contains_key(id) {
            return Err(DirectoryError::NotFound(id.to_string()));
        }
        let previous = self.endpoints.write().insert(id.clone(), endpoint.to_string());
        info!(node_id = %id, endpoint = %endpoint, previous = ?previous, "Endpoint registered");
        self.resolve(id)
    }

    pub fn deregister(&self, id: &NodeId) -> Result<(), DirectoryError> {
        if !self.positions.contains_key(id) {
            return Err(DirectoryError::NotFound(id.to_string()));
        }
        if self.endpoints.write().remove(id).is_some() {
            info!(node_id = %id, "Endpoint deregistered");
        }
        Ok(())
    }

    /// Every roster position with its current endpoint.
    pub fn list(&self) -> Vec<Resolution> {
        let mut ids: Vec<&NodeId> = self.positions.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.resolve(id).ok()).collect()
    }
}

impl From<DirectoryError> for LinkError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => LinkError::Remote(TroopError::NotFound(id)),
            other => LinkError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl DirectoryLink for Directory {
    async fn resolve(&self, id: &NodeId) -> Result<Resolution, LinkError> {
        Ok(Directory::resolve(self, id)?)
    }

    async fn register_endpoint(&self, id: &NodeId, endpoint: &str) -> Result<Resolution, LinkError> {
        Ok(Directory::register_endpoint(self, id, endpoint)?)
    }

    async fn deregister(&self, id: &NodeId) -> Result<(), LinkError> {
        Ok(Directory::deregister(self, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::NodeRole;

    const ROSTER: &str = r#"
troops:
  - id: c1
    name: commander
    subs:
      - id: r1
        name: leader
        place: floor1
        subs:
          - id: l1
            name: sensortag
            place: room1
"#;

    fn directory() -> Directory {
        Directory::from_roster(&Roster::from_yaml_str(ROSTER).unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_unknown_id() {
        let directory = directory();
        assert!(matches!(
            directory.resolve(&NodeId::new("x9")),
            Err(DirectoryError::NotFound(id)) if id == "x9"
        ));
    }

    #[test]
    fn test_superior_endpoint_follows_registration() {
        let directory = directory();
        let l1 = NodeId::new("l1");

        let resolution = directory.register_endpoint(&l1, "http://l1:53000/").unwrap();
        assert_eq!(resolution.role, NodeRole::Leaf);
        assert_eq!(resolution.place.as_deref(), Some("room1"));
        assert_eq!(resolution.superior, Some(NodeId::new("r1")));
        assert!(resolution.superior_endpoint.is_none());

        directory.register_endpoint(&NodeId::new("r1"), "http://r1:52000/").unwrap();
        let resolution = directory.resolve(&l1).unwrap();
        assert_eq!(resolution.superior_endpoint.as_deref(), Some("http://r1:52000/"));

        directory.deregister(&NodeId::new("r1")).unwrap();
        assert!(directory.resolve(&l1).unwrap().superior_endpoint.is_none());
    }

    #[test]
    fn test_register_unknown_id_rejected() {
        let directory = directory();
        assert!(directory.register_endpoint(&NodeId::new("x9"), "http://x9/").is_err());
    }

    #[tokio::test]
    async fn test_link_maps_not_found() {
        let directory = directory();
        let link: &dyn DirectoryLink = &directory;
        let err = link.resolve(&NodeId::new("x9")).await.unwrap_err();
        assert_eq!(err, LinkError::Remote(TroopError::NotFound("x9".to_string())));
    }
}
