//! 通信プロトコル定義
//!
//! Proxy↔Coordinator間、Proxy↔Proxy間の通信メッセージ

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{MeshError, MeshResult};
use crate::types::{EndpointDescriptor, EndpointTable, ProxySummary};

/// 転送先ターゲットを指定するヘッダー
pub const DESTINATION_HEADER: &str = "x-chatmesh-destination";

/// レスポンスステータス
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// 成功
    Success,
    /// 失敗
    Error,
}

/// Proxy登録リクエスト
///
/// 欠けたフィールドは [`RegisterRequest::validate`] で検出するため、
/// デシリアライズ時点ではすべて任意扱い。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegisterRequest {
    /// Proxy識別子
    #[serde(default)]
    pub proxy_id: String,
    /// インスタンス名
    #[serde(default)]
    pub instance_name: String,
    /// Proxyのホスト
    #[serde(default)]
    pub host: String,
    /// Proxyのポート
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl RegisterRequest {
    /// 必須フィールドの検証
    pub fn validate(&self) -> MeshResult<u16> {
        let mut missing = Vec::new();
        if self.proxy_id.trim().is_empty() {
            missing.push("proxy_id");
        }
        if self.instance_name.trim().is_empty() {
            missing.push("instance_name");
        }
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        match self.port {
            Some(port) if missing.is_empty() => Ok(port),
            Some(_) => Err(missing_fields(&missing)),
            None => {
                missing.push("port");
                Err(missing_fields(&missing))
            }
        }
    }
}

fn missing_fields(fields: &[&str]) -> MeshError {
    MeshError::Validation(format!("Missing required fields: {}", fields.join(", ")))
}

/// エンドポイントテーブルを返すレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointsResponse {
    /// ステータス
    pub status: ResponseStatus,
    /// メッセージ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// エンドポイントテーブル
    #[serde(default)]
    pub endpoints: EndpointTable,
}

impl EndpointsResponse {
    /// 成功レスポンス
    pub fn success(message: Option<String>, endpoints: EndpointTable) -> Self {
        Self {
            status: ResponseStatus::Success,
            message,
            endpoints,
        }
    }
}

/// `GET /api/getendpoints` のクエリ
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointsQuery {
    /// Proxy識別子
    #[serde(default)]
    pub proxy_id: Option<String>,
}

/// エンドポイント部分更新リクエスト
///
/// `endpoints` はオブジェクト、またはオブジェクトを表すJSON文字列。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateEndpointsRequest {
    /// 部分テーブル
    #[serde(default)]
    pub endpoints: Option<Value>,
}

impl UpdateEndpointsRequest {
    /// 部分テーブルをオブジェクトとして取り出す
    pub fn into_update(self) -> MeshResult<Map<String, Value>> {
        match self.endpoints {
            Some(Value::Object(map)) => Ok(map),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err(MeshError::Validation(
                    "endpoints must be a JSON object".to_string(),
                )),
                Err(e) => Err(MeshError::Validation(format!(
                    "Invalid JSON format for endpoints: {e}"
                ))),
            },
            Some(_) => Err(MeshError::Validation(
                "endpoints must be a JSON object".to_string(),
            )),
            None => Err(MeshError::Validation("Missing endpoints".to_string())),
        }
    }
}

/// ハートビートリクエスト
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatRequest {
    /// Proxy識別子
    #[serde(default)]
    pub proxy_id: String,
}

/// ステータスとメッセージのみのレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckResponse {
    /// ステータス
    pub status: ResponseStatus,
    /// メッセージ
    pub message: String,
}

impl AckResponse {
    /// 成功レスポンス
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    /// エラーレスポンス
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

/// 登録済みProxy一覧
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxiesResponse {
    /// ステータス
    pub status: ResponseStatus,
    /// Proxy一覧
    pub proxies: Vec<ProxySummary>,
}

/// `GET /peers` で認証情報の値を置き換える文字列
pub const REDACTED: &str = "[redacted]";

fn is_credential_name(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["auth", "key", "token", "secret"]
        .iter()
        .any(|marker| name.contains(marker))
}

fn redact_values(values: &mut BTreeMap<String, String>) {
    for (name, value) in values.iter_mut() {
        if is_credential_name(name) {
            *value = REDACTED.to_string();
        }
    }
}

/// 認証ヘッダー・キー系クエリパラメータの値を伏せた記述子
pub fn redact_credentials(descriptor: &EndpointDescriptor) -> EndpointDescriptor {
    match descriptor {
        EndpointDescriptor::Peer(peer) => EndpointDescriptor::Peer(peer.clone()),
        EndpointDescriptor::Api(api) => {
            let mut api = api.clone();
            redact_values(&mut api.headers);
            if let Some(params) = api.params.as_mut() {
                redact_values(params);
            }
            EndpointDescriptor::Api(api)
        }
    }
}

/// `GET /peers` のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeersResponse {
    /// 自インスタンス名
    pub instance: String,
    /// 現在のエンドポイントテーブル（認証情報は伏せる）
    pub peers: EndpointTable,
}

impl PeersResponse {
    /// エンドポイントテーブルから作成
    pub fn from_table(instance: impl Into<String>, table: &EndpointTable) -> Self {
        Self {
            instance: instance.into(),
            peers: table
                .iter()
                .map(|(name, descriptor)| (name.clone(), redact_credentials(descriptor)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_request_validation() {
        let request: RegisterRequest = serde_json::from_value(json!({
            "proxy_id": "p1",
            "instance_name": "alice",
            "host": "127.0.0.1",
            "port": 8081
        }))
        .unwrap();
        assert_eq!(request.validate().unwrap(), 8081);
    }

    #[test]
    fn test_register_request_reports_missing_fields() {
        let request: RegisterRequest =
            serde_json::from_value(json!({"proxy_id": "p1", "host": ""})).unwrap();

        let err = request.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("instance_name"));
        assert!(message.contains("host"));
        assert!(message.contains("port"));
        assert!(!message.contains("proxy_id"));
    }

    #[test]
    fn test_update_request_accepts_object_or_json_text() {
        let object = UpdateEndpointsRequest {
            endpoints: Some(json!({"carol": {"host": "127.0.0.1", "port": 10004}})),
        };
        let text = UpdateEndpointsRequest {
            endpoints: Some(json!(r#"{"carol": {"host": "127.0.0.1", "port": 10004}}"#)),
        };

        assert_eq!(object.into_update().unwrap(), text.into_update().unwrap());
    }

    #[test]
    fn test_update_request_rejects_non_objects() {
        for endpoints in [None, Some(json!([1, 2])), Some(json!("not json")), Some(json!("[1]"))] {
            let request = UpdateEndpointsRequest { endpoints };
            assert!(matches!(
                request.into_update(),
                Err(MeshError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_peers_response_redacts_only_credentials() {
        let table: EndpointTable = serde_json::from_value(json!({
            "alice": {"host": "127.0.0.1", "port": 10001},
            "BOT": {
                "host": "generativelanguage.googleapis.com",
                "is_api": true,
                "path": "/v1beta/models/gemini-pro:generateContent",
                "headers": {
                    "Authorization": "Bearer secret-1",
                    "x-api-key": "secret-2",
                    "Content-Type": "application/json"
                },
                "params": {"key": "secret-3", "alt": "json"},
                "transform_request": "gemini_chat",
                "model_config": {"temperature": 0.5}
            }
        }))
        .unwrap();

        let value = serde_json::to_value(PeersResponse::from_table("bob", &table)).unwrap();
        assert_eq!(value["instance"], json!("bob"));
        assert_eq!(value["peers"]["alice"], json!({"host": "127.0.0.1", "port": 10001, "is_api": false}));

        let bot = &value["peers"]["BOT"];
        assert_eq!(bot["is_api"], json!(true));
        assert_eq!(bot["path"], json!("/v1beta/models/gemini-pro:generateContent"));
        assert_eq!(bot["transform_request"], json!("gemini_chat"));
        assert_eq!(bot["model_config"]["temperature"], json!(0.5));
        assert_eq!(bot["headers"]["Content-Type"], json!("application/json"));
        assert_eq!(bot["headers"]["Authorization"], json!(REDACTED));
        assert_eq!(bot["headers"]["x-api-key"], json!(REDACTED));
        assert_eq!(bot["params"]["key"], json!(REDACTED));
        assert_eq!(bot["params"]["alt"], json!("json"));
        assert!(!value.to_string().contains("secret-"));
    }

    #[test]
    fn test_ack_response_serialization() {
        let value = serde_json::to_value(AckResponse::error("Unknown peer: carol")).unwrap();
        assert_eq!(
            value,
            json!({"status": "error", "message": "Unknown peer: carol"})
        );
    }
}
