// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types of the troop tree: identities, directives, work, errors and
//! the ports through which nodes, sinks and reading providers are reached.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod directive;
pub mod directory;
pub mod error;
pub mod events;
pub mod link;
pub mod node;
pub mod node_config;
pub mod reading;
pub mod retry;
pub mod sink;
pub mod work;
