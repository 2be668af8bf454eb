// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Leaf Node - order execution
//!
//! Each active Order runs one execution task on its timer. A tick samples
//! every required reading provider concurrently, stamps the batch with the
//! current time and the Order's purpose, and pushes it to the relay as Work.
//! A provider that is missing or fails contributes a null reading for its
//! name only.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::endpoint::{SubordinateEndpoint, TroopNode};
use crate::application::join::Enlistable;
use crate::application::schedule::spawn_periodic;
use crate::domain::directive::{Directive, Order};
use crate::domain::directory::Resolution;
use crate::domain::error::TroopError;
use crate::domain::events::TroopEvent;
use crate::domain::link::SuperiorLink;
use crate::domain::node::{NodeId, NodeIdentity, NodeInfo};
use crate::domain::reading::ProviderLookup;
use crate::domain::work::{Reading, Work};
use crate::infrastructure::event_bus::EventBus;

pub struct LeafServices {
    pub providers: Arc<dyn ProviderLookup>,
    pub events: EventBus,
}

struct ActiveOrder {
    order: Order,
    cancel: CancellationToken,
}

struct LeafState {
    identity: NodeIdentity,
    superior: Option<Arc<dyn SuperiorLink>>,
    orders: BTreeMap<String, ActiveOrder>,
}

pub struct LeafNode {
    id: NodeId,
    services: LeafServices,
    state: Mutex<LeafState>,
    shutdown: CancellationToken,
    self_ref: Weak<LeafNode>,
}

impl LeafNode {
    pub fn new(identity: NodeIdentity, services: LeafServices) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            id: identity.id.clone(),
            services,
            state: Mutex::new(LeafState {
                identity,
                superior: None,
                orders: BTreeMap::new(),
            }),
            shutdown: CancellationToken::new(),
            self_ref: self_ref.clone(),
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.services.events
    }

    pub async fn identity(&self) -> NodeIdentity {
        self.state.lock().await.identity.clone()
    }

    /// Install an Order, cancelling the one it supersedes.
    pub async fn accept_order(&self, order: Order) -> Result<(), TroopError> {
        if order.author != self.id {
            return Err(TroopError::InvalidDirective(format!(
                "order for '{}' delivered to '{}'",
                order.author, self.id
            )));
        }
        if order.purpose.is_empty() {
            return Err(TroopError::InvalidDirective("purpose cannot be empty".to_string()));
        }
        order.trigger.validate()?;
        let purpose = order.purpose.clone();

        let replaced = {
            let mut state = self.state.lock().await;
            if let Some(active) = state.orders.get(&purpose) {
                if active.order == order {
                    return Ok(());
                }
            }
            let replaced = match state.orders.remove(&purpose) {
                Some(old) => {
                    old.cancel.cancel();
                    true
                }
                None => false,
            };
            let cancel = self.shutdown.child_token();
            self.start_execution(&order, cancel.clone());
            state.orders.insert(purpose.clone(), ActiveOrder { order, cancel });
            replaced
        };

        info!(node_id = %self.id, purpose = %purpose, replaced, "Order accepted");
        self.services.events.publish(TroopEvent::OrderAccepted {
            node_id: self.id.clone(),
            purpose,
            accepted_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn remove_order(&self, purpose: &str) -> Result<(), TroopError> {
        {
            let mut state = self.state.lock().await;
            let Some(active) = state.orders.remove(purpose) else {
                return Err(TroopError::NotFound(purpose.to_string()));
            };
            active.cancel.cancel();
        }

        info!(node_id = %self.id, purpose = %purpose, "Order removed");
        self.services.events.publish(TroopEvent::OrderRemoved {
            node_id: self.id.clone(),
            purpose: purpose.to_string(),
            removed_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state
            .lock()
            .await
            .orders
            .values()
            .map(|active| active.order.clone())
            .collect()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        info!(node_id = %self.id, "Shutting down leaf node");
        self.shutdown.cancel();
    }

    /// Sample every named provider concurrently.
    pub async fn sample(&self, requirements: &BTreeSet<String>) -> BTreeMap<String, Reading> {
        let readings = join_all(requirements.iter().map(|name| async move {
            let reading = match self.services.providers.provider(name) {
                Some(provider) => match provider.read().await {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!(node_id = %self.id, reading = %name, error = %e, "Reading failed");
                        Reading::null()
                    }
                },
                None => {
                    warn!(node_id = %self.id, reading = %name, "No reading provider with this name");
                    Reading::null()
                }
            };
            (name.clone(), reading)
        }))
        .await;
        readings.into_iter().collect()
    }

    fn start_execution(&self, order: &Order, cancel: CancellationToken) {
        let Some(period) = order.trigger.period() else {
            debug!(node_id = %self.id, purpose = %order.purpose, "Order has no timer; nothing scheduled");
            return;
        };
        let weak = self.self_ref.clone();
        let purpose = order.purpose.clone();
        let tick_cancel = cancel.clone();
        spawn_periodic(period, cancel, move || {
            let weak = weak.clone();
            let purpose = purpose.clone();
            let cancel = tick_cancel.clone();
            async move {
                if let Some(leaf) = weak.upgrade() {
                    leaf.execute(&purpose, &cancel).await;
                }
            }
        });
    }

    async fn execute(&self, purpose: &str, cancel: &CancellationToken) {
        let (order, superior, place) = {
            let state = self.state.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            let Some(active) = state.orders.get(purpose) else {
                return;
            };
            (active.order.clone(), state.superior.clone(), state.identity.place.clone())
        };

        let values = self.sample(&order.requirements).await;
        let work = Work {
            time: Utc::now(),
            purpose: order.purpose.clone(),
            author: self.id.clone(),
            place,
            values,
        };

        let Some(superior) = superior else {
            warn!(node_id = %self.id, purpose = %purpose, "No superior attached; work dropped");
            return;
        };
        match superior.submit_work(&self.id, &work).await {
            Ok(()) => debug!(node_id = %self.id, purpose = %purpose, readings = work.values.len(), "Work sent"),
            Err(e) => warn!(node_id = %self.id, purpose = %purpose, error = %e, "Work transmission failed; work dropped"),
        }
    }
}

#[async_trait]
impl TroopNode for LeafNode {
    fn node_id(&self) -> &NodeId {
        &self.id
    }

    async fn node_info(&self) -> NodeInfo {
        let state = self.state.lock().await;
        let mut info = state.identity.to_info();
        info.directives = state
            .orders
            .values()
            .map(|active| Directive::Order(active.order.clone()))
            .collect();
        info
    }
}

#[async_trait]
impl SubordinateEndpoint for LeafNode {
    async fn accept_directive(&self, directive: Directive) -> Result<(), TroopError> {
        match directive {
            Directive::Order(order) => self.accept_order(order).await,
            other => Err(TroopError::InvalidDirective(format!(
                "leaf '{}' accepts orders, not {}s",
                self.id,
                other.kind()
            ))),
        }
    }

    async fn withdraw_directive(&self, purpose: &str) -> Result<(), TroopError> {
        self.remove_order(purpose).await
    }

    async fn active_purposes(&self) -> BTreeSet<String> {
        self.state.lock().await.orders.keys().cloned().collect()
    }
}

#[async_trait]
impl Enlistable for LeafNode {
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
