//! REST APIハンドラー
//!
//! Proxy登録、エンドポイント配布、ハートビート

pub mod error;
pub mod proxies;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// APIルーターを作成
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/register", post(proxies::register_proxy))
        .route("/api/getendpoints", get(proxies::get_endpoints))
        .route(
            "/api/update_proxy_endpoints/:proxy_id",
            post(proxies::update_endpoints),
        )
        .route("/api/heartbeat", post(proxies::heartbeat))
        .route("/api/remove_proxy/:proxy_id", post(proxies::remove_proxy))
        .route("/api/proxies", get(proxies::list_proxies))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
