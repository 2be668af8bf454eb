// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sink and Alert Ports
//!
//! External collaborators of the root tier: durable storage for finalized
//! report records, and an operational alert channel for `_error` notices.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::work::SinkRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink rejected records: {0}")]
    Rejected(String),

    #[error("sink unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn push(&self, records: Vec<SinkRecord>) -> Result<(), SinkError>;
}

/// Maps a Campaign `destination` to a sink, if it names one.
pub trait SinkResolver: Send + Sync {
    fn resolve(&self, destination: &str) -> Option<Arc<dyn ReportSink>>;
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn notify(&self, message: &str);
}
