//! Status HTTP server
//!
//! Axum server answering JSON-RPC status calls on `POST /`.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::methods::{handle_request, ApiState, JsonRpcRequest, JsonRpcResponse};

/// Routes of the status API
pub fn api_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handle_rpc))
        .layer(cors)
        .with_state(state)
}

/// Serve the status API on `port` until `shutdown` turns true
pub async fn start_api_server(
    state: Arc<ApiState>,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "status API listening");

    axum::serve(listener, api_router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

/// Handle incoming JSON-RPC requests
async fn handle_rpc(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<JsonRpcRequest>,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let response = handle_request(&state, request);
    (StatusCode::OK, Json(response))
}
