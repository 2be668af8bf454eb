// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process network
//!
//! Binds endpoint strings to node services living in the same process, so a
//! whole troop tree can run inside one test or embedding host. Nodes are held
//! weakly: dropping a node makes its endpoint unreachable, exactly like a
//! stopped process. [`InProcessNetwork::set_reachable`] simulates a network
//! partition without dropping anything.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use crate::application::endpoint::{SubordinateEndpoint, SuperiorEndpoint};
use crate::domain::directive::Directive;
use crate::domain::error::LinkError;
use crate::domain::link::{SubordinateLink, SuperiorConnector, SuperiorLink};
use crate::domain::node::{CacheToken, NodeId, NodeInfo, PollOutcome};
use crate::domain::work::{Report, Work};

#[derive(Default)]
struct Bindings {
    superiors: HashMap<String, Weak<dyn SuperiorEndpoint>>,
    subordinates: HashMap<String, Weak<dyn SubordinateEndpoint>>,
    unreachable: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct InProcessNetwork {
    bindings: Arc<RwLock<Bindings>>,
}

impl InProcessNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `node`'s superior operations at `endpoint`.
    pub fn bind_superior<N>(&self, endpoint: impl Into<String>, node: &Arc<N>)
    where
        N: SuperiorEndpoint + 'static,
    {
        let node: Arc<dyn SuperiorEndpoint> = node.clone();
        self.bindings
            .write()
            .superiors
            .insert(endpoint.into(), Arc::downgrade(&node));
    }

    /// Serve `node`'s delivery operations at `endpoint`.
    pub fn bind_subordinate<N>(&self, endpoint: impl Into<String>, node: &Arc<N>)
    where
        N: SubordinateEndpoint + 'static,
    {
        let node: Arc<dyn SubordinateEndpoint> = node.clone();
        self.bindings
            .write()
            .subordinates
            .insert(endpoint.into(), Arc::downgrade(&node));
    }

    pub fn unbind(&self, endpoint: &str) {
        let mut bindings = self.bindings.write();
        bindings.superiors.remove(endpoint);
        bindings.subordinates.remove(endpoint);
    }

    /// Cut or restore every call to `endpoint`.
    pub fn set_reachable(&self, endpoint: &str, reachable: bool) {
        let mut bindings = self.bindings.write();
        if reachable {
            bindings.unreachable.remove(endpoint);
        } else {
            bindings.unreachable.insert(endpoint.to_string());
        }
    }

    fn superior(&self, endpoint: &str) -> Result<Arc<dyn SuperiorEndpoint>, LinkError> {
        let bindings = self.bindings.read();
        if bindings.unreachable.contains(endpoint) {
            return Err(unreachable(endpoint));
        }
        bindings
            .superiors
            .get(endpoint)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable(endpoint))
    }

    fn subordinate(&self, endpoint: &str) -> Result<Arc<dyn SubordinateEndpoint>, LinkError> {
        let bindings = self.bindings.read();
        if bindings.unreachable.contains(endpoint) {
            return Err(unreachable(endpoint));
        }
        bindings
            .subordinates
            .get(endpoint)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable(endpoint))
    }
}

fn unreachable(endpoint: &str) -> LinkError {
    LinkError::Transport(format!("no node reachable at {}", endpoint))
}

/// A [`SuperiorLink`] bound to one endpoint of an [`InProcessNetwork`].
/// The target is looked up on every call.
pub struct InProcessSuperior {
    network: InProcessNetwork,
    endpoint: String,
}

#[async_trait]
impl SuperiorLink for InProcessSuperior {
    async fn register(&self, info: &NodeInfo) -> Result<NodeInfo, LinkError> {
        let superior = self.network.superior(&self.endpoint)?;
        Ok(superior.register(info.clone()).await?)
    }

    async fn heartbeat(&self, id: &NodeId) -> Result<(), LinkError> {
        let superior = self.network.superior(&self.endpoint)?;
        Ok(superior.heartbeat(id).await?)
    }

    async fn poll_info(&self, id: &NodeId, token: Option<&CacheToken>) -> Result<PollOutcome, LinkError> {
        let superior = self.network.superior(&self.endpoint)?;
        Ok(superior.poll_info(id, token).await?)
    }

    async fn submit_work(&self, id: &NodeId, work: &Work) -> Result<(), LinkError> {
        let superior = self.network.superior(&self.endpoint)?;
        Ok(superior.submit_work(id, work.clone()).await?)
    }

    async fn submit_report(&self, id: &NodeId, report: &Report) -> Result<(), LinkError> {
        let superior = self.network.superior(&self.endpoint)?;
        Ok(superior.submit_report(id, report.clone()).await?)
    }
}

impl SuperiorConnector for InProcessNetwork {
    fn connect(&self, endpoint: &str) -> Arc<dyn SuperiorLink> {
        Arc::new(InProcessSuperior {
            network: self.clone(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SubordinateLink for InProcessNetwork {
    async fn deliver(&self, endpoint: &str, directive: &Directive) -> Result<(), LinkError> {
        let subordinate = self.subordinate(endpoint)?;
        Ok(subordinate.accept_directive(directive.clone()).await?)
    }

    async fn withdraw(&self, endpoint: &str, purpose: &str) -> Result<(), LinkError> {
        let subordinate = self.subordinate(endpoint)?;
        Ok(subordinate.withdraw_directive(purpose).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::root::{RootNode, RootServices, RootSettings};
    use crate::domain::error::TroopError;
    use crate::domain::node::{NodeIdentity, NodeRole};
    use crate::infrastructure::alerts::LogAlertChannel;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::sinks::SinkRegistry;

    fn root() -> Arc<RootNode> {
        RootNode::new(
            NodeIdentity::new("c1", "commander", NodeRole::Root, "mem://c1"),
            RootSettings::default(),
            RootServices {
                downlink: None,
                sinks: Arc::new(SinkRegistry::new()),
                alerts: Arc::new(LogAlertChannel),
                events: EventBus::new(16),
            },
        )
    }

    #[tokio::test]
    async fn test_calls_reach_bound_node() {
        let network = InProcessNetwork::new();
        let root = root();
        network.bind_superior("mem://c1", &root);

        let link = network.connect("mem://c1");
        let info = NodeIdentity::new("r1", "relay", NodeRole::Relay, "mem://r1").to_info();
        let stored = link.register(&info).await.unwrap();
        assert_eq!(stored.id, NodeId::new("r1"));

        let err = link.register(&info).await.unwrap_err();
        assert_eq!(err, LinkError::Remote(TroopError::AlreadyRegistered("r1".to_string())));
        root.shutdown();
    }

    #[tokio::test]
    async fn test_partition_and_drop_are_transport_failures() {
        let network = InProcessNetwork::new();
        let root = root();
        network.bind_superior("mem://c1", &root);
        let link = network.connect("mem://c1");
        let id = NodeId::new("r1");

        network.set_reachable("mem://c1", false);
        assert!(link.heartbeat(&id).await.unwrap_err().is_transient());

        network.set_reachable("mem://c1", true);
        assert_eq!(
            link.heartbeat(&id).await.unwrap_err(),
            LinkError::Remote(TroopError::UnknownSubordinate("r1".to_string()))
        );

        root.shutdown();
        drop(root);
        assert!(link.heartbeat(&id).await.unwrap_err().is_transient());
    }
}
