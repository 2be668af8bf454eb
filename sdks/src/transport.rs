// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared request plumbing for the HTTP links.
//!
//! A non-success response whose body is a `{kind, subject, message}`
//! failure becomes [`LinkError::Remote`] with the same [`TroopError`]
//! variant the peer raised; anything else is a transport failure.

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use troops_core::domain::error::{ApiFailure, LinkError, TroopError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client with the default request timeout.
pub fn default_client() -> Client {
    Client::builder().timeout(DEFAULT_TIMEOUT).build().unwrap_or_default()
}

/// `base` with `segments` appended as escaped path segments.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, LinkError> {
    let mut url = Url::parse(base).map_err(|e| LinkError::Transport(format!("invalid endpoint '{}': {}", base, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| LinkError::Transport(format!("endpoint '{}' cannot carry a path", base)))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

pub(crate) async fn send(request: RequestBuilder) -> Result<Response, LinkError> {
    let response = request
        .send()
        .await
        .map_err(|e| LinkError::Transport(e.to_string()))?;
    if response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED {
        return Ok(response);
    }
    Err(failure(response).await)
}

pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, LinkError> {
    let response = send(request).await?;
    response
        .json()
        .await
        .map_err(|e| LinkError::Transport(format!("invalid response body: {}", e)))
}

async fn failure(response: Response) -> LinkError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = %status, body = %body, "Request failed");
    match serde_json::from_str::<ApiFailure>(&body) {
        Ok(failure) => LinkError::Remote(TroopError::from(failure)),
        Err(_) => LinkError::Transport(format!("{}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_segments() {
        let url = endpoint_url("http://10.0.0.2:53000/", &["subordinates", "l1", "heartbeat"]).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.2:53000/subordinates/l1/heartbeat");

        let url = endpoint_url("http://10.0.0.2:53000", &["directives", "air quality"]).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.2:53000/directives/air%20quality");
    }

    #[test]
    fn test_invalid_endpoint_is_transport_failure() {
        let err = endpoint_url("not a url", &["info"]).unwrap_err();
        assert!(err.is_transient());
    }
}
