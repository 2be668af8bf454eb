// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP binding of the node services.
//!
//! Each tier gets one router assembled from shared pieces: every node serves
//! `/health` and `/info`, superiors serve `/subordinates`, subordinates
//! accept push delivery on `/directives`. Failures are returned as the
//! `{kind, subject, message}` body with a status derived from the kind.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::directory::Directory;
use crate::application::endpoint::{SubordinateEndpoint, SuperiorEndpoint, TroopNode};
use crate::application::leaf::LeafNode;
use crate::application::relay::RelayNode;
use crate::application::root::RootNode;
use crate::domain::directive::{Campaign, Directive};
use crate::domain::directory::DirectoryError;
use crate::domain::error::{FailureKind, TroopError};
use crate::domain::node::{CacheToken, NodeId, NodeInfo, PollOutcome};
use crate::domain::work::{Report, Work};

pub struct ApiError(TroopError);

impl From<TroopError> for ApiError {
    fn from(err: TroopError) -> Self {
        Self(err)
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => Self(TroopError::NotFound(id)),
            other => Self(TroopError::Unsupported(other.to_string())),
        }
    }
}

pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::AlreadyRegistered => StatusCode::CONFLICT,
        FailureKind::UnknownSubordinate | FailureKind::NotFound | FailureKind::TargetNotFound => {
            StatusCode::NOT_FOUND
        }
        FailureKind::InvalidDirective | FailureKind::Unsupported => StatusCode::BAD_REQUEST,
        FailureKind::SuperiorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let failure = self.0.to_failure();
        (status_for(failure.kind), Json(failure)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Body of `PUT /nodes/{id}/endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRegistration {
    pub endpoint: String,
}

pub fn root_router(root: Arc<RootNode>) -> Router {
    let operator = Router::new()
        .route("/campaigns", get(list_campaigns).post(submit_campaign))
        .route("/campaigns/{purpose}", delete(remove_campaign))
        .route("/reports", get(list_reports))
        .with_state(root.clone());

    node_router(root.clone())
        .merge(superior_router(root))
        .merge(operator)
        .layer(TraceLayer::new_for_http())
}

pub fn relay_router(relay: Arc<RelayNode>) -> Router {
    let inspection = Router::new()
        .route("/work", get(buffered_work))
        .with_state(relay.clone());

    node_router(relay.clone())
        .merge(superior_router(relay.clone()))
        .merge(subordinate_router(relay))
        .merge(inspection)
        .layer(TraceLayer::new_for_http())
}

pub fn leaf_router(leaf: Arc<LeafNode>) -> Router {
    let inspection = Router::new()
        .route("/orders", get(list_orders))
        .with_state(leaf.clone());

    node_router(leaf.clone())
        .merge(subordinate_router(leaf))
        .merge(inspection)
        .layer(TraceLayer::new_for_http())
}

pub fn directory_router(directory: Arc<Directory>) -> Router {
    Router::new()
        .route("/health", get(directory_health))
        .route("/nodes", get(list_nodes))
        .route("/nodes/{id}", get(resolve_node))
        .route(
            "/nodes/{id}/endpoint",
            put(register_endpoint).delete(deregister_endpoint),
        )
        .with_state(directory)
        .layer(TraceLayer::new_for_http())
}

fn node_router(node: Arc<dyn TroopNode>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(node_info))
        .with_state(node)
}

fn superior_router(node: Arc<dyn SuperiorEndpoint>) -> Router {
    Router::new()
        .route("/subordinates", get(list_subordinates).post(register))
        .route("/subordinates/{id}", get(poll_info))
        .route("/subordinates/{id}/heartbeat", post(heartbeat))
        .route("/subordinates/{id}/work", post(submit_work))
        .route("/subordinates/{id}/report", post(submit_report))
        .with_state(node)
}

fn subordinate_router(node: Arc<dyn SubordinateEndpoint>) -> Router {
    Router::new()
        .route("/directives", put(accept_directive))
        .route("/directives/{purpose}", delete(withdraw_directive))
        .with_state(node)
}

async fn health(State(node): State<Arc<dyn TroopNode>>) -> impl IntoResponse {
    Json(json!({ "status": "healthy", "node_id": node.node_id() }))
}

async fn node_info(State(node): State<Arc<dyn TroopNode>>) -> Json<NodeInfo> {
    Json(node.node_info().await)
}

async fn list_subordinates(State(node): State<Arc<dyn SuperiorEndpoint>>) -> Json<Vec<NodeInfo>> {
    Json(node.list_subordinates().await)
}

async fn register(
    State(node): State<Arc<dyn SuperiorEndpoint>>,
    Json(info): Json<NodeInfo>,
) -> ApiResult<impl IntoResponse> {
    let stored = node.register(info).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Quoted entity tag for a cache token.
pub fn etag(token: &CacheToken) -> String {
    format!("\"{}\"", token)
}

/// Cache token carried by an `If-None-Match` or `ETag` header value.
pub fn parse_etag(value: &str) -> CacheToken {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    CacheToken(value.trim_matches('"').to_string())
}

async fn poll_info(
    State(node): State<Arc<dyn SuperiorEndpoint>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(parse_etag);

    let response = match node.poll_info(&NodeId(id), token.as_ref()).await? {
        PollOutcome::NotModified => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            if let Some(token) = token.as_ref().and_then(|t| HeaderValue::from_str(&etag(t)).ok()) {
                response.headers_mut().insert(header::ETAG, token);
            }
            response
        }
        PollOutcome::Modified { info, token } => {
            let mut response = Json(info).into_response();
            if let Ok(value) = HeaderValue::from_str(&etag(&token)) {
                response.headers_mut().insert(header::ETAG, value);
            }
            response
        }
    };
    Ok(response)
}

async fn heartbeat(State(node): State<Arc<dyn SuperiorEndpoint>>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    node.heartbeat(&NodeId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_work(
    State(node): State<Arc<dyn SuperiorEndpoint>>,
    Path(id): Path<String>,
    Json(work): Json<Work>,
) -> ApiResult<StatusCode> {
    node.submit_work(&NodeId(id), work).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn submit_report(
    State(node): State<Arc<dyn SuperiorEndpoint>>,
    Path(id): Path<String>,
    Json(report): Json<Report>,
) -> ApiResult<StatusCode> {
    node.submit_report(&NodeId(id), report).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn accept_directive(
    State(node): State<Arc<dyn SubordinateEndpoint>>,
    Json(directive): Json<Directive>,
) -> ApiResult<StatusCode> {
    node.accept_directive(directive).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn withdraw_directive(
    State(node): State<Arc<dyn SubordinateEndpoint>>,
    Path(purpose): Path<String>,
) -> ApiResult<StatusCode> {
    node.withdraw_directive(&purpose).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_campaigns(State(root): State<Arc<RootNode>>) -> Json<Vec<Campaign>> {
    Json(root.list_campaigns().await)
}

async fn submit_campaign(
    State(root): State<Arc<RootNode>>,
    Json(campaign): Json<Campaign>,
) -> ApiResult<impl IntoResponse> {
    let accepted = root.submit_campaign(campaign).await?;
    Ok((StatusCode::CREATED, Json(accepted)))
}

async fn remove_campaign(State(root): State<Arc<RootNode>>, Path(purpose): Path<String>) -> ApiResult<StatusCode> {
    root.remove_campaign(&purpose).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reports(State(root): State<Arc<RootNode>>) -> Json<Vec<Report>> {
    Json(root.reports().await)
}

async fn buffered_work(State(relay): State<Arc<RelayNode>>) -> impl IntoResponse {
    Json(relay.buffered_work().await)
}

async fn list_orders(State(leaf): State<Arc<LeafNode>>) -> impl IntoResponse {
    Json(leaf.orders().await)
}

async fn directory_health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "directory" }))
}

async fn list_nodes(State(directory): State<Arc<Directory>>) -> impl IntoResponse {
    Json(directory.list())
}

async fn resolve_node(State(directory): State<Arc<Directory>>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(directory.resolve(&NodeId(id))?))
}

async fn register_endpoint(
    State(directory): State<Arc<Directory>>,
    Path(id): Path<String>,
    Json(body): Json<EndpointRegistration>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(directory.register_endpoint(&NodeId(id), &body.endpoint)?))
}

async fn deregister_endpoint(
    State(directory): State<Arc<Directory>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    directory.deregister(&NodeId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::leaf::LeafServices;
    use crate::application::root::{RootServices, RootSettings};
    use crate::domain::directive::{Mission, Placement, Trigger};
    use crate::domain::directory::Roster;
    use crate::domain::error::ApiFailure;
    use crate::domain::node::{NodeIdentity, NodeRole};
    use crate::infrastructure::alerts::LogAlertChannel;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::readings::ProviderRegistry;
    use crate::infrastructure::sinks::SinkRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn root() -> Arc<RootNode> {
        RootNode::new(
            NodeIdentity::new("c1", "commander", NodeRole::Root, "http://c1/"),
            RootSettings::default(),
            RootServices {
                downlink: None,
                sinks: Arc::new(SinkRegistry::new()),
                alerts: Arc::new(LogAlertChannel),
                events: EventBus::new(16),
            },
        )
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn relay_info() -> serde_json::Value {
        serde_json::to_value(NodeIdentity::new("r1", "leader", NodeRole::Relay, "http://r1/").to_info()).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_duplicate_conflicts() {
        let root = root();
        let app = root_router(root.clone());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/subordinates", relay_info()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request("POST", "/subordinates", relay_info()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let failure: ApiFailure = body_json(response).await;
        assert_eq!(failure.kind, FailureKind::AlreadyRegistered);
        assert_eq!(failure.subject, "r1");
        root.shutdown();
    }

    #[tokio::test]
    async fn test_poll_info_etag_round_trip() {
        let root = root();
        let app = root_router(root.clone());
        app.clone()
            .oneshot(json_request("POST", "/subordinates", relay_info()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/subordinates/r1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let tag = response.headers().get(header::ETAG).unwrap().to_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get("/subordinates/r1")
                    .header(header::IF_NONE_MATCH, &tag)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        let response = app
            .oneshot(Request::get("/subordinates/x9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        root.shutdown();
    }

    #[tokio::test]
    async fn test_campaign_routes() {
        let root = root();
        let app = root_router(root.clone());

        let campaign = json!({
            "author": "operator",
            "destination": "memory://weather",
            "place": "All",
            "purpose": "p1",
            "requirements": ["temperature"],
            "trigger": {"timer": 10}
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/campaigns", campaign))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(Request::get("/campaigns").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let campaigns: Vec<Campaign> = body_json(response).await;
        assert_eq!(campaigns.len(), 1);

        let response = app
            .clone()
            .oneshot(Request::delete("/campaigns/p1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::delete("/campaigns/p1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        root.shutdown();
    }

    #[tokio::test]
    async fn test_leaf_rejects_mission_delivery() {
        let leaf = LeafNode::new(
            NodeIdentity::new("l1", "sensortag", NodeRole::Leaf, "http://l1/"),
            LeafServices {
                providers: Arc::new(ProviderRegistry::with_builtins()),
                events: EventBus::new(16),
            },
        );
        let app = leaf_router(leaf.clone());
        let mission = Directive::Mission(Mission {
            author: NodeId::new("l1"),
            place: Placement::All,
            purpose: "p1".to_string(),
            requirements: Default::default(),
            trigger: Trigger::timer(5),
        });

        let response = app
            .oneshot(json_request("PUT", "/directives", serde_json::to_value(&mission).unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let failure: ApiFailure = body_json(response).await;
        assert_eq!(failure.kind, FailureKind::InvalidDirective);
        leaf.shutdown();
    }

    #[tokio::test]
    async fn test_directory_routes() {
        let roster = Roster::from_yaml_str(
            r#"
troops:
  - id: c1
    name: commander
    subs:
      - id: r1
        name: leader
        place: floor1
"#,
        )
        .unwrap();
        let app = directory_router(Arc::new(Directory::from_roster(&roster).unwrap()));

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/nodes/c1/endpoint", json!({"endpoint": "http://c1/"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(Request::get("/nodes/r1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let resolution: crate::domain::directory::Resolution = body_json(response).await;
        assert_eq!(resolution.superior_endpoint.as_deref(), Some("http://c1/"));

        let response = app
            .oneshot(Request::get("/nodes/x9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_parse_etag_variants() {
        assert_eq!(parse_etag("\"abc\"").as_str(), "abc");
        assert_eq!(parse_etag("W/\"abc\"").as_str(), "abc");
        assert_eq!(parse_etag("abc").as_str(), "abc");
    }
}
