//! POST / と POST /*path - メッセージのルーティング

use super::error::AppError;
use crate::{routing, AppState};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use chatmesh_common::{
    error::MeshError,
    protocol::{AckResponse, DESTINATION_HEADER},
};
use serde_json::{Map, Value};
use tracing::info;

/// 宛先を取り出す
///
/// `x-chatmesh-destination` ヘッダーを優先し、なければ `Host` のホスト部分を使う。
pub fn destination(headers: &HeaderMap) -> Option<String> {
    let explicit = headers
        .get(DESTINATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(target) = explicit {
        return Some(target.to_string());
    }

    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(|host| host.split(':').next())
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

fn parse_envelope(body: &[u8]) -> Result<Value, MeshError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body)
        .map_err(|e| MeshError::Validation(format!("Request body must be JSON: {e}")))
}

/// 宛先を解決し、配送をスケジュールして即座に応答する
pub async fn route_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AckResponse>, AppError> {
    let target = destination(&headers).unwrap_or_default();
    let table = state.snapshot.table().await;
    let route = routing::route_for(&table, &state.identity, &target)?;
    let envelope = parse_envelope(&body)?;

    info!(destination = %target, route = route.kind(), "Routing message");
    let ack = state.dispatcher.dispatch(route, envelope)?;
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn destination_header_wins_over_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("bob:8082"));
        assert_eq!(destination(&headers).as_deref(), Some("bob"));

        headers.insert(DESTINATION_HEADER, HeaderValue::from_static("BOT"));
        assert_eq!(destination(&headers).as_deref(), Some("BOT"));
    }

    #[test]
    fn missing_destination_is_none() {
        assert!(destination(&HeaderMap::new()).is_none());
    }

    #[test]
    fn empty_body_is_empty_envelope() {
        assert_eq!(parse_envelope(b"").unwrap(), Value::Object(Map::new()));
        assert!(matches!(
            parse_envelope(b"{oops"),
            Err(MeshError::Validation(_))
        ));
    }
}
