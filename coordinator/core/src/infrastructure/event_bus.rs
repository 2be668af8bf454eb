// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Troop Events
//
// In-memory event streaming over tokio broadcast channels. Nodes publish
// membership and directive changes; tests and observers subscribe.
// Events are not persisted.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::TroopEvent;
use crate::domain::node::NodeId;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TroopEvent>,
}

impl EventBus {
    /// Capacity is how many events a slow subscriber may fall behind
    /// before it starts losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: TroopEvent) {
        debug!("Publishing event: {:?}", event);

        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events raised by one node only.
    pub fn subscribe_node(&self, node_id: NodeId) -> NodeEventReceiver {
        NodeEventReceiver {
            receiver: self.sender.subscribe(),
            node_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<TroopEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<TroopEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<TroopEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

pub struct NodeEventReceiver {
    receiver: broadcast::Receiver<TroopEvent>,
    node_id: NodeId,
}

impl NodeEventReceiver {
    /// Receive the next event raised by the subscribed node, skipping others.
    pub async fn recv(&mut self) -> Result<TroopEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.node_id() == &self.node_id {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn joined(node: &str, sub: &str) -> TroopEvent {
        TroopEvent::SubordinateJoined {
            node_id: NodeId::new(node),
            subordinate_id: NodeId::new(sub),
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(joined("c1", "r1"));

        match receiver.recv().await.unwrap() {
            TroopEvent::SubordinateJoined { subordinate_id, .. } => {
                assert_eq!(subordinate_id, NodeId::new("r1"));
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_filtering() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe_node(NodeId::new("r1"));

        bus.publish(joined("c1", "r1"));
        bus.publish(joined("r1", "l1"));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.node_id(), &NodeId::new("r1"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(10);
        bus.publish(joined("c1", "r1"));
        assert_eq!(bus.subscriber_count(), 0);

        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
