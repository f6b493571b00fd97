//! GET /peers

use crate::AppState;
use axum::{extract::State, Json};
use chatmesh_common::protocol::PeersResponse;

/// GET /peers - 自インスタンス名と現在のスナップショット
pub async fn list_peers(State(state): State<AppState>) -> Json<PeersResponse> {
    let table = state.snapshot.table().await;
    Json(PeersResponse::from_table(
        state.identity.instance_name.clone(),
        &table,
    ))
}
