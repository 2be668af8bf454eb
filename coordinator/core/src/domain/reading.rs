// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Reading Providers
//!
//! The leaf tier samples values through named providers. Hardware drivers
//! live outside the core and plug in by implementing [`ReadingProvider`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::work::Reading;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no reading provider named '{0}'")]
    Unknown(String),

    #[error("reading failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ReadingProvider: Send + Sync {
    async fn read(&self) -> Result<Reading, ProviderError>;
}

/// Lookup of providers by requirement name.
pub trait ProviderLookup: Send + Sync {
    fn provider(&self, name: &str) -> Option<std::sync::Arc<dyn ReadingProvider>>;
    fn names(&self) -> Vec<String>;
}
