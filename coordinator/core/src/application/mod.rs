// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services: the three node tiers, the directory, and the
//! machinery they share (liveness, fan-out, scheduling, join and uplink).
//!
//! # Architecture
//!
//! - **Layer:** Application Layer

pub mod backoff;
pub mod directory;
pub mod dispatch;
pub mod endpoint;
pub mod join;
pub mod leaf;
pub mod liveness;
pub mod membership;
pub mod relay;
pub mod root;
pub mod schedule;
pub mod uplink;
pub mod work_buffer;

pub use directory::Directory;
pub use endpoint::{SubordinateEndpoint, SuperiorEndpoint, TroopNode};
pub use join::{enlist, join, Enlistable, JoinOutcome};
pub use leaf::{LeafNode, LeafServices};
pub use liveness::{LivenessMonitor, WatchState};
pub use relay::{RelayNode, RelayServices, RelaySettings};
pub use root::{RootNode, RootServices, RootSettings};
pub use uplink::{spawn_uplink, UplinkError, UplinkSettings};
