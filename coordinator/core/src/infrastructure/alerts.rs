// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alert channels for operational notices raised by the root.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

use crate::domain::sink::AlertChannel;

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn notify(&self, message: &str) {
        error!(alert = %message, "Troop alert");
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

/// Posts alerts to a Slack-style incoming webhook, and logs them.
pub struct WebhookAlertChannel {
    client: reqwest::Client,
    url: String,
    channel: Option<String>,
    username: Option<String>,
}

impl WebhookAlertChannel {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            channel: None,
            username: None,
        }
    }

    pub fn with_channel(mut self, channel: Option<String>) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }
}

#[async_trait]
impl AlertChannel for WebhookAlertChannel {
    async fn notify(&self, message: &str) {
        error!(alert = %message, "Troop alert");
        let payload = WebhookPayload {
            text: message,
            channel: self.channel.as_deref(),
            username: self.username.as_deref(),
        };
        let result = self
            .client
            .post(&self.url)
            .timeout(Duration::from_secs(10))
            .json(&payload)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(status = %response.status(), "Alert webhook rejected the alert"),
            Err(e) => warn!(error = %e, "Alert webhook unreachable"),
        }
    }
}

/// Keeps alerts in memory.
#[derive(Debug, Default)]
pub struct RecordingAlertChannel {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlertChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl AlertChannel for RecordingAlertChannel {
    async fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_webhook_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/troops")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "text": "relay-r1's error: leaf l1 evicted",
                "channel": "#sensing",
                "username": "troops"
            })))
            .with_status(200)
            .create_async()
            .await;

        let channel = WebhookAlertChannel::new(reqwest::Client::new(), format!("{}/hooks/troops", server.url()))
            .with_channel(Some("#sensing".to_string()))
            .with_username(Some("troops".to_string()));
        channel.notify("relay-r1's error: leaf l1 evicted").await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_fail() {
        let channel = WebhookAlertChannel::new(reqwest::Client::new(), "http://127.0.0.1:9/hook");
        channel.notify("relay-r1 evicted").await;
    }
}
