// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Work, Reports and Sink Records
//!
//! - [`Work`] — one sampled batch produced by a leaf tick.
//! - [`Report`] — a relay's rollup of the Work buffered for one purpose.
//! - [`SinkRecord`] — one flattened leaf value, as pushed to a sink.
//!
//! The reserved purpose [`ERROR_PURPOSE`] marks an out-of-band error notice;
//! its single Work entry carries the message under the `msg` reading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::node::NodeId;

/// Purpose reserved for error notifications travelling up the tree.
pub const ERROR_PURPOSE: &str = "_error";

const ERROR_MESSAGE_KEY: &str = "msg";

/// A measured value with its unit. Both are `None` when the reading failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: Option<serde_json::Value>,
    pub unit: Option<String>,
}

impl Reading {
    pub fn new(value: impl Into<serde_json::Value>, unit: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            unit: Some(unit.into()),
        }
    }

    pub fn unitless(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: Some(value.into()),
            unit: None,
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub time: DateTime<Utc>,
    pub purpose: String,
    /// Producing leaf.
    pub author: NodeId,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, Reading>,
}

impl Work {
    /// Label used in composed place paths.
    pub fn place_label(&self) -> &str {
        self.place.as_deref().unwrap_or(self.author.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub time: DateTime<Utc>,
    pub purpose: String,
    /// Sending relay.
    pub author: NodeId,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub values: Vec<Work>,
}

impl Report {
    /// Build an error notice from `author` carrying `message`.
    pub fn error_notice(author: NodeId, place: Option<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut values = BTreeMap::new();
        values.insert(ERROR_MESSAGE_KEY.to_string(), Reading::unitless(message.into()));
        Self {
            time: now,
            purpose: ERROR_PURPOSE.to_string(),
            author: author.clone(),
            place: place.clone(),
            values: vec![Work {
                time: now,
                purpose: ERROR_PURPOSE.to_string(),
                author,
                place,
                values,
            }],
        }
    }

    pub fn is_error_notice(&self) -> bool {
        self.purpose == ERROR_PURPOSE
    }

    /// Diagnostic message of an error notice.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error_notice() {
            return None;
        }
        let reading = self.values.first()?.values.get(ERROR_MESSAGE_KEY)?;
        match reading.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn place_label(&self) -> &str {
        self.place.as_deref().unwrap_or(self.author.as_str())
    }

    /// Flatten into one sink record per leaf value, tagged with the
    /// `relay.leaf` place path, the Work's time and `purpose`.
    pub fn flatten(&self, purpose: &str) -> Vec<SinkRecord> {
        let mut records = Vec::new();
        for work in &self.values {
            let place = format!("{}.{}", self.place_label(), work.place_label());
            for (name, reading) in &work.values {
                records.push(SinkRecord {
                    purpose: purpose.to_string(),
                    place: place.clone(),
                    time: work.time,
                    name: name.clone(),
                    value: reading.value.clone(),
                    unit: reading.unit.clone(),
                });
            }
        }
        records
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub purpose: String,
    pub place: String,
    pub time: DateTime<Utc>,
    pub name: String,
    pub value: Option<serde_json::Value>,
    pub unit: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work(leaf: &str, place: Option<&str>, temp: f64) -> Work {
        let mut values = BTreeMap::new();
        values.insert("temperature".to_string(), Reading::new(temp, "degC"));
        values.insert("humidity".to_string(), Reading::null());
        Work {
            time: Utc::now(),
            purpose: "p1".to_string(),
            author: NodeId::new(leaf),
            place: place.map(str::to_string),
            values,
        }
    }

    #[test]
    fn test_flatten_one_record_per_value() {
        let report = Report {
            time: Utc::now(),
            purpose: "p1".to_string(),
            author: NodeId::new("r1"),
            place: Some("floor1".to_string()),
            values: vec![work("l1", Some("room1"), 21.0), work("l2", None, 22.5)],
        };

        let records = report.flatten("p1");
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.purpose == "p1"));
        assert!(records.iter().any(|r| r.place == "floor1.room1"));
        assert!(records.iter().any(|r| r.place == "floor1.l2"));

        let null_humidity = records.iter().find(|r| r.name == "humidity").unwrap();
        assert!(null_humidity.value.is_none());
        assert!(null_humidity.unit.is_none());
    }

    #[test]
    fn test_error_notice_carries_message() {
        let report = Report::error_notice(NodeId::new("r1"), None, "leaf l1 evicted");
        assert!(report.is_error_notice());
        assert_eq!(report.values.len(), 1);
        assert_eq!(report.error_message().as_deref(), Some("leaf l1 evicted"));
    }

    #[test]
    fn test_regular_report_has_no_error_message() {
        let report = Report {
            time: Utc::now(),
            purpose: "p1".to_string(),
            author: NodeId::new("r1"),
            place: None,
            values: vec![],
        };
        assert!(report.error_message().is_none());
    }
}
