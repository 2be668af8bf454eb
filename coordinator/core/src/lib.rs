// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Troops Core
//!
//! A three-tier sensing network: a root assigns Campaigns, relays turn them
//! into Missions for their leaves and roll the Work they push into Reports,
//! leaves sample readings on a timer. Membership is kept alive by heartbeats
//! or conditional polls; silent subordinates are evicted.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Node services, transport ports and their adapters

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
