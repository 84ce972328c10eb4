/// RPC server exposing node-management operations. An external collaborator
/// to the Synchronizer Engine — the engine never calls into this; it runs
/// alongside it as a sibling component.
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::metrics;
use crate::nodegroup::{Group, NodeGroupRegistry};

#[derive(Clone)]
pub struct RpcState {
    pub nodes: Arc<NodeGroupRegistry>,
}

#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RemoveNodeRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    url: Option<String>,
}

fn parse_group(raw: &str) -> Result<Group, Response> {
    match raw {
        "core" => Ok(Group::Core),
        other => Err((
            StatusCode::NOT_FOUND,
            format!("unknown node group: {other}"),
        )
            .into_response()),
    }
}

async fn list_nodes(State(state): State<RpcState>, Path(group): Path<String>) -> Response {
    match parse_group(&group) {
        Ok(group) => Json(state.nodes.list(group)).into_response(),
        Err(resp) => resp,
    }
}

async fn add_node(
    State(state): State<RpcState>,
    Path(group): Path<String>,
    Json(req): Json<AddNodeRequest>,
) -> Response {
    match parse_group(&group) {
        Ok(group) => {
            state.nodes.add(group, req.url);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}

async fn remove_node(
    State(state): State<RpcState>,
    Path(group): Path<String>,
    Json(req): Json<RemoveNodeRequest>,
) -> Response {
    match parse_group(&group) {
        Ok(group) => {
            state.nodes.remove(group, &req.url);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}

async fn list_all(State(state): State<RpcState>) -> Response {
    Json(state.nodes.list_all()).into_response()
}

async fn node_status(
    State(state): State<RpcState>,
    Path(group): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match parse_group(&group) {
        Ok(group) => match state.nodes.status(group, query.url.as_deref()) {
            Some(status) => Json(status).into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
        Err(resp) => resp,
    }
}

async fn metrics_handler() -> Response {
    (StatusCode::OK, metrics::gather_metrics()).into_response()
}

async fn healthz() -> Response {
    StatusCode::OK.into_response()
}

pub fn build_router(state: RpcState) -> Router {
    Router::new()
        .route("/nodes", get(list_all))
        .route("/nodes/{group}", get(list_nodes).post(add_node).delete(remove_node))
        .route("/nodes/{group}/status", get(node_status))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: &str, state: RpcState) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind, "node-management RPC server listening");
    axum::serve(listener, app).await
}
