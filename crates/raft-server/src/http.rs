//! # http
//!
//! why: carry raft rpcs between nodes over plain http
//! relations: wraps node.rs; the raw request body goes straight to raft-core's handlers
//! what: router with /vote, /append, /status and a serve loop with graceful shutdown

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use raft_core::{AppendEntriesResponse, RequestVoteResponse};
use tokio::net::TcpListener;
use tokio::task;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::node::{Node, NodeStatus};

/// Build the rpc router for a node
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/vote", post(vote))
        .route("/append", post(append))
        .route("/status", get(status))
        .with_state(node)
        .layer(TraceLayer::new_for_http())
}

// rpcs take the node lock and fsync, so they run on the blocking pool

/// POST /vote
async fn vote(State(node): State<Arc<Node>>, body: Bytes) -> Result<Json<RequestVoteResponse>> {
    let response = task::spawn_blocking(move || node.request_vote(&body)).await??;
    Ok(Json(response))
}

/// POST /append
async fn append(State(node): State<Arc<Node>>, body: Bytes) -> Result<Json<AppendEntriesResponse>> {
    let response = task::spawn_blocking(move || node.append_entries(&body)).await??;
    Ok(Json(response))
}

/// GET /status
async fn status(State(node): State<Arc<Node>>) -> Json<NodeStatus> {
    Json(node.status())
}

/// Serve rpcs until `shutdown` resolves and in-flight requests drain
pub async fn serve<F>(listener: TcpListener, node: Arc<Node>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(node))
        .with_graceful_shutdown(shutdown)
        .await
}
