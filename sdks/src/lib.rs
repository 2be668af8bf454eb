// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Troops Rust SDK
//!
//! HTTP bindings of the node transport ports, for processes that run one
//! node each, plus an operator client for a root's campaigns.

pub mod client;
pub mod directory;
pub mod links;
pub mod transport;

pub use client::RootClient;
pub use directory::HttpDirectoryClient;
pub use links::{HttpConnector, HttpSubordinateLink, HttpSuperiorLink};
