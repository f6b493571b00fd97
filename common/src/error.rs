//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `MeshError`は`status_code()`と`external_message()`を提供し、
//! Coordinator / Proxy の両方で同じ形式のエラーレスポンスを生成する。

use axum::http::StatusCode;
use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for CommonError {
    fn from(err: config::ConfigError) -> Self {
        CommonError::Config(err.to_string())
    }
}

/// chatmesh error type
#[derive(Debug, Error)]
pub enum MeshError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Malformed or missing fields in a registry write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown proxy_id
    #[error("Unknown proxy: {0}")]
    ProxyNotFound(String),

    /// Routing target could not be resolved
    #[error("Unknown peer: {0}")]
    UnknownTarget(String),

    /// Vendor response could not be normalized
    #[error("Upstream transform error: {0}")]
    UpstreamTransform(String),

    /// Network failure talking to a peer, proxy, vendor or the coordinator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service cannot accept more work right now
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Returns the message sent back to HTTP clients.
    ///
    /// Registry and routing errors carry caller-supplied identifiers and are
    /// returned verbatim. Transport and internal errors may contain addresses
    /// of other services, so only a generic message is exposed; the full error
    /// goes to the server log.
    pub fn external_message(&self) -> String {
        match self {
            Self::Common(_) => "Request error".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::ProxyNotFound(_) => "Unknown proxy".to_string(),
            Self::UnknownTarget(target) => format!("Unknown peer: {target}"),
            Self::UpstreamTransform(_) => "Failed to process API response".to_string(),
            Self::Transport(_) => "Backend service unavailable".to_string(),
            Self::ServiceUnavailable(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(CommonError::Serialization(_)) => StatusCode::BAD_REQUEST,
            Self::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ProxyNotFound(_) => StatusCode::NOT_FOUND,
            Self::UnknownTarget(_) => StatusCode::NOT_FOUND,
            Self::UpstreamTransform(_) => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for the not-found family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProxyNotFound(_) | Self::UnknownTarget(_))
    }
}

/// Result type for chatmesh operations
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            MeshError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MeshError::ProxyNotFound("p".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MeshError::UnknownTarget("carol".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MeshError::ServiceUnavailable("busy".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_external_message_hides_transport_details() {
        let err = MeshError::Transport("connect 10.1.2.3:10002 refused".into());
        assert!(!err.external_message().contains("10.1.2.3"));
        assert!(err.to_string().contains("10.1.2.3"));
    }

    #[test]
    fn test_unknown_target_message_names_target() {
        let err = MeshError::UnknownTarget("carol".into());
        assert_eq!(err.external_message(), "Unknown peer: carol");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_serialization_error_is_bad_request() {
        let err: MeshError = CommonError::from(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        )
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
