//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    response::IntoResponse,
    Json,
};
use chatmesh_common::{error::MeshError, protocol::AckResponse};
use tracing::{debug, warn};

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub MeshError);

impl From<MeshError> for AppError {
    fn from(err: MeshError) -> Self {
        AppError(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(MeshError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError(MeshError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }

        (status, Json(AckResponse::error(self.0.external_message()))).into_response()
    }
}
