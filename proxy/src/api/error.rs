//! APIエラーレスポンス型

use axum::{response::IntoResponse, Json};
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

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "Routing request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "Routing request rejected");
        }

        (status, Json(AckResponse::error(self.0.external_message()))).into_response()
    }
}
