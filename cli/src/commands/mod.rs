// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the troops CLI

pub mod campaign;
pub mod config;

pub use self::campaign::{CampaignCommand, RootTarget};
pub use self::config::ConfigCommand;
