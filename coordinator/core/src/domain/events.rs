// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::node::NodeId;

/// Lifecycle events raised by a node as its tables change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TroopEvent {
    SubordinateJoined {
        node_id: NodeId,
        subordinate_id: NodeId,
        joined_at: DateTime<Utc>,
    },
    SubordinateEvicted {
        node_id: NodeId,
        subordinate_id: NodeId,
        evicted_at: DateTime<Utc>,
    },
    CampaignAccepted {
        node_id: NodeId,
        purpose: String,
        targets: usize,
        accepted_at: DateTime<Utc>,
    },
    CampaignRemoved {
        node_id: NodeId,
        purpose: String,
        removed_at: DateTime<Utc>,
    },
    MissionAccepted {
        node_id: NodeId,
        purpose: String,
        targets: usize,
        accepted_at: DateTime<Utc>,
    },
    MissionRemoved {
        node_id: NodeId,
        purpose: String,
        removed_at: DateTime<Utc>,
    },
    OrderAccepted {
        node_id: NodeId,
        purpose: String,
        accepted_at: DateTime<Utc>,
    },
    OrderRemoved {
        node_id: NodeId,
        purpose: String,
        removed_at: DateTime<Utc>,
    },
    ReportAccepted {
        node_id: NodeId,
        from: NodeId,
        purpose: String,
        work_items: usize,
        accepted_at: DateTime<Utc>,
    },
    ReportForwarded {
        node_id: NodeId,
        purpose: String,
        work_items: usize,
        forwarded_at: DateTime<Utc>,
    },
}

impl TroopEvent {
    /// Node that raised the event.
    pub fn node_id(&self) -> &NodeId {
        match self {
            TroopEvent::SubordinateJoined { node_id, .. }
            | TroopEvent::SubordinateEvicted { node_id, .. }
            | TroopEvent::CampaignAccepted { node_id, .. }
            | TroopEvent::CampaignRemoved { node_id, .. }
            | TroopEvent::MissionAccepted { node_id, .. }
            | TroopEvent::MissionRemoved { node_id, .. }
            | TroopEvent::OrderAccepted { node_id, .. }
            | TroopEvent::OrderRemoved { node_id, .. }
            | TroopEvent::ReportAccepted { node_id, .. }
            | TroopEvent::ReportForwarded { node_id, .. } => node_id,
        }
    }
}
