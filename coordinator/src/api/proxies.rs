//! Proxy登録・エンドポイント配布API

use super::error::AppError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    Json,
};
use chatmesh_common::{
    error::MeshError,
    protocol::{
        AckResponse, EndpointsQuery, EndpointsResponse, HeartbeatRequest, ProxiesResponse,
        RegisterRequest, ResponseStatus, UpdateEndpointsRequest,
    },
};

/// POST /api/register - Proxy登録
pub async fn register_proxy(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<EndpointsResponse>, AppError> {
    let Json(req) = payload?;
    let endpoints = state.registry.register(req).await?;
    Ok(Json(EndpointsResponse::success(
        Some("Proxy registered successfully".to_string()),
        endpoints,
    )))
}

/// GET /api/getendpoints?proxy_id= - エンドポイントテーブル取得
pub async fn get_endpoints(
    State(state): State<AppState>,
    query: Result<Query<EndpointsQuery>, QueryRejection>,
) -> Result<Json<EndpointsResponse>, AppError> {
    let Query(query) = query?;
    let proxy_id = query
        .proxy_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| MeshError::Validation("Missing proxy_id".to_string()))?;

    let endpoints = state.registry.get_endpoints(&proxy_id).await?;
    Ok(Json(EndpointsResponse::success(None, endpoints)))
}

/// POST /api/update_proxy_endpoints/:proxy_id - エンドポイント部分更新
pub async fn update_endpoints(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
    payload: Result<Json<UpdateEndpointsRequest>, JsonRejection>,
) -> Result<Json<EndpointsResponse>, AppError> {
    // 未登録のproxy_idはペイロードより先に404で返す
    state.registry.get(&proxy_id).await?;

    let Json(req) = payload?;
    let update = req.into_update()?;
    let endpoints = state.registry.update_endpoints(&proxy_id, update).await?;
    Ok(Json(EndpointsResponse::success(
        Some("Endpoints updated successfully".to_string()),
        endpoints,
    )))
}

/// POST /api/heartbeat - 生存通知
pub async fn heartbeat(
    State(state): State<AppState>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<AckResponse>, AppError> {
    let Json(req) = payload?;
    if req.proxy_id.trim().is_empty() {
        return Err(MeshError::Validation("Missing proxy_id".to_string()).into());
    }
    state.registry.heartbeat(&req.proxy_id).await?;
    Ok(Json(AckResponse::success("Heartbeat received")))
}

/// POST /api/remove_proxy/:proxy_id - Proxy削除
pub async fn remove_proxy(
    State(state): State<AppState>,
    Path(proxy_id): Path<String>,
) -> Result<Json<AckResponse>, AppError> {
    state.registry.remove(&proxy_id).await?;
    Ok(Json(AckResponse::success(format!(
        "Proxy {proxy_id} removed successfully"
    ))))
}

/// GET /api/proxies - 登録済みProxy一覧
pub async fn list_proxies(State(state): State<AppState>) -> Json<ProxiesResponse> {
    Json(ProxiesResponse {
        status: ResponseStatus::Success,
        proxies: state.registry.list().await,
    })
}
