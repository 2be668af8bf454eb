// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Directives
//!
//! The three directive tiers, linked by a shared `purpose` key:
//!
//! | Tier | Type | Owner | Derived from |
//! |------|------|-------|--------------|
//! | Root | [`Campaign`] | Root | operator submission |
//! | Relay | [`Mission`] | Relay | one per target relay |
//! | Leaf | [`Order`] | Leaf | one per target leaf |
//!
//! Derivation is a pure constructor ([`Campaign::derive_mission`],
//! [`Mission::derive_order`]); derived copies share no mutable state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::domain::error::TroopError;
use crate::domain::node::NodeId;

/// Placement filter for fan-out: every current subordinate, or one named id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Placement {
    #[default]
    All,
    Node(NodeId),
}

impl From<String> for Placement {
    fn from(value: String) -> Self {
        if value == "All" {
            Placement::All
        } else {
            Placement::Node(NodeId(value))
        }
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        match value {
            Placement::All => "All".to_string(),
            Placement::Node(id) => id.0,
        }
    }
}

impl Placement {
    pub fn matches(&self, id: &NodeId) -> bool {
        match self {
            Placement::All => true,
            Placement::Node(target) => target == id,
        }
    }

    /// Compute the fan-out target set among `members`.
    ///
    /// A named target that is not a current member fails with
    /// `TargetNotFound`; callers decide whether that aborts anything.
    pub fn select<'a>(&self, members: impl IntoIterator<Item = &'a NodeId>) -> Result<Vec<NodeId>, TroopError> {
        match self {
            Placement::All => Ok(members.into_iter().cloned().collect()),
            Placement::Node(target) => {
                if members.into_iter().any(|m| m == target) {
                    Ok(vec![target.clone()])
                } else {
                    Err(TroopError::TargetNotFound(target.to_string()))
                }
            }
        }
    }
}

/// Longest accepted trigger timer (30 days).
pub const MAX_TIMER_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Schedule descriptor. Only a fixed timer interval (seconds) is supported;
/// a trigger without a timer schedules nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u64>,
}

impl Trigger {
    pub fn timer(seconds: u64) -> Self {
        Self { timer: Some(seconds) }
    }

    pub fn period(&self) -> Option<Duration> {
        match self.timer {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    /// Reject timers longer than [`MAX_TIMER_SECONDS`].
    pub fn validate(&self) -> Result<(), TroopError> {
        match self.timer {
            Some(secs) if secs > MAX_TIMER_SECONDS => Err(TroopError::InvalidDirective(format!(
                "timer of {}s exceeds the maximum of {}s",
                secs, MAX_TIMER_SECONDS
            ))),
            _ => Ok(()),
        }
    }
}

/// Root-level directive submitted by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub author: String,
    /// Sink target identifier (e.g. `memory://weather`, `http://sink/records`).
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub place: Placement,
    /// Identity key; unique among active campaigns of one root.
    pub purpose: String,
    #[serde(default)]
    pub requirements: BTreeSet<String>,
    #[serde(default)]
    pub trigger: Trigger,
}

impl Campaign {
    pub fn derive_mission(&self, target: &NodeId) -> Mission {
        Mission {
            author: target.clone(),
            place: Placement::All,
            purpose: self.purpose.clone(),
            requirements: self.requirements.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

/// Relay-level directive, one per target relay of a [`Campaign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    /// Target relay id.
    pub author: NodeId,
    /// Placement among the relay's leaves.
    #[serde(default)]
    pub place: Placement,
    pub purpose: String,
    #[serde(default)]
    pub requirements: BTreeSet<String>,
    #[serde(default)]
    pub trigger: Trigger,
}

impl Mission {
    pub fn derive_order(&self, target: &NodeId) -> Order {
        Order {
            author: target.clone(),
            purpose: self.purpose.clone(),
            requirements: self.requirements.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

/// Leaf-level directive, one per target leaf of a [`Mission`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Target leaf id.
    pub author: NodeId,
    pub purpose: String,
    #[serde(default)]
    pub requirements: BTreeSet<String>,
    #[serde(default)]
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    Campaign(Campaign),
    Mission(Mission),
    Order(Order),
}

impl Directive {
    pub fn purpose(&self) -> &str {
        match self {
            Directive::Campaign(c) => &c.purpose,
            Directive::Mission(m) => &m.purpose,
            Directive::Order(o) => &o.purpose,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Directive::Campaign(_) => "campaign",
            Directive::Mission(_) => "mission",
            Directive::Order(_) => "order",
        }
    }
}
