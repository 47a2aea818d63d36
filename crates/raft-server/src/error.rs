//! # error
//!
//! why: give the runtime one error type for everything that is not a protocol outcome
//! relations: returned by node.rs, mapped to http responses in http.rs
//! what: NodeError and its IntoResponse mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use raft_core::ConfigError;
use raft_storage::StorageError;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// the change could not be made durable and was rolled back in memory
    #[error("persistence failed: {0}")]
    Storage(#[from] StorageError),

    #[error("rpc worker failed: {0}")]
    Worker(#[from] JoinError),
}

pub type Result<T> = std::result::Result<T, NodeError>;

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        // protocol rejections are ordinary 200 replies; only local faults land here
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
