// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Report sinks
//!
//! A Campaign's `destination` names where its flattened records go:
//!
//! - `memory://<name>` and any other name registered in-process resolve to
//!   the registered sink (tests, embedding).
//! - `http://` / `https://` URLs resolve to an [`HttpSink`] that POSTs the
//!   records as a JSON array.
//!
//! Anything else resolves to nothing and the report is only cached.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::sink::{ReportSink, SinkError, SinkResolver};
use crate::domain::work::SinkRecord;

#[derive(Default)]
pub struct SinkRegistry {
    named: RwLock<HashMap<String, Arc<dyn ReportSink>>>,
    http: Option<reqwest::Client>,
}

impl SinkRegistry {
    /// Registry that resolves registered names only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that also resolves `http(s)://` destinations.
    pub fn with_http(client: reqwest::Client) -> Self {
        Self {
            named: RwLock::new(HashMap::new()),
            http: Some(client),
        }
    }

    pub fn register(&self, destination: impl Into<String>, sink: Arc<dyn ReportSink>) {
        self.named.write().insert(destination.into(), sink);
    }
}

impl SinkResolver for SinkRegistry {
    fn resolve(&self, destination: &str) -> Option<Arc<dyn ReportSink>> {
        if let Some(sink) = self.named.read().get(destination) {
            return Some(sink.clone());
        }
        let is_http = destination.starts_with("http://") || destination.starts_with("https://");
        match &self.http {
            Some(client) if is_http => Some(Arc::new(HttpSink::new(client.clone(), destination))),
            _ => None,
        }
    }
}

/// Keeps every pushed record in memory.
#[derive(Default)]
pub struct InMemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ReportSink for InMemorySink {
    async fn push(&self, records: Vec<SinkRecord>) -> Result<(), SinkError> {
        self.records.lock().extend(records);
        Ok(())
    }
}

pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpSink {
    async fn push(&self, records: Vec<SinkRecord>) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(10))
            .json(&records)
            .send()
            .await
            .map_err(|e| SinkError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected(format!("{}: {}", status, body)));
        }
        Ok(())
    }
}
