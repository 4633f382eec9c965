//! HTTP surface of the node.
//!
//! | Method | Path                | Description                  |
//! |--------|---------------------|------------------------------|
//! | GET    | `/health`           | Liveness check               |
//! | POST   | `/mine_block/`      | Mine a block with `data`     |
//! | GET    | `/blockchain/`      | Full chain                   |
//! | GET    | `/validate/`        | Chain validity               |
//! | GET    | `/blockchain/last/` | Last block                   |
//!
//! Every chain route refuses with 400 while the chain fails validation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hashchain_core::{pow::CancelFlag, Block, ChainError, SharedChain};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::constants::{INVALID_CHAIN_DETAIL, VALID_CHAIN_MESSAGE};

#[derive(Clone)]
pub struct AppState {
    pub chain: SharedChain,
    /// Raised on shutdown to stop in-flight searches.
    pub cancel: CancelFlag,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct BlockData {
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

/// Block as returned to clients: digests and payload in hex, plus the payload
/// decoded as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub index: u64,
    pub timestamp: u64,
    pub data: String,
    pub payload: String,
    pub nonce: u64,
    pub previous_hash: String,
    pub hash: String,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            index: block.index(),
            timestamp: block.timestamp(),
            data: String::from_utf8_lossy(block.payload()).into_owned(),
            payload: hex::encode(block.payload()),
            nonce: block.nonce(),
            previous_hash: hex::encode(block.previous_hash()),
            hash: hex::encode(block.hash()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("mining task failed: {0}")]
    Join(#[from] task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Chain(ChainError::ChainInvalid(e)) => {
                warn!("rejecting request: {e}");
                (StatusCode::BAD_REQUEST, INVALID_CHAIN_DETAIL.to_string())
            }
            ApiError::Chain(ChainError::Cancelled) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            _ => {
                error!("request failed: {self}");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/mine_block/", post(mine_block))
        .route("/blockchain/", get(blockchain))
        .route("/validate/", get(validate))
        .route("/blockchain/last/", get(last_block))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn mine_block(
    State(state): State<AppState>,
    Json(body): Json<BlockData>,
) -> Result<Json<BlockView>, ApiError> {
    // SharedChain::mine_block refuses an invalid chain itself.
    let AppState { chain, cancel } = state;
    let block = task::spawn_blocking(move || chain.mine_block(body.data, &cancel)).await??;
    Ok(Json(BlockView::from(&block)))
}

async fn blockchain(State(state): State<AppState>) -> Result<Json<Vec<BlockView>>, ApiError> {
    state.chain.validate()?;
    let blocks = state.chain.snapshot()?;
    Ok(Json(blocks.iter().map(BlockView::from).collect()))
}

async fn validate(State(state): State<AppState>) -> Result<Json<Message>, ApiError> {
    state.chain.validate()?;
    Ok(Json(Message {
        message: VALID_CHAIN_MESSAGE.to_string(),
    }))
}

async fn last_block(State(state): State<AppState>) -> Result<Json<BlockView>, ApiError> {
    state.chain.validate()?;
    let block = state.chain.previous_block()?;
    Ok(Json(BlockView::from(&block)))
}
