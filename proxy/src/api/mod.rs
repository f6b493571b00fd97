//! Proxy HTTP API
//!
//! 到達可能なターゲットの一覧と、メッセージのルーティング

pub mod error;
pub mod peers;
pub mod route;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// APIルーターを作成
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/peers", get(peers::list_peers))
        .route("/", post(route::route_message))
        .route("/*path", post(route::route_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
