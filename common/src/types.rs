//! 共通型定義
//!
//! EndpointDescriptor, RegisteredProxy, MessageEnvelope 等のコアデータ型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// すべてのエンドポイントテーブルに必ず存在するターゲット名
pub const BOT_TARGET: &str = "BOT";

/// ターゲット名 → エンドポイント記述子
pub type EndpointTable = BTreeMap<String, EndpointDescriptor>;

/// ピア（別インスタンスのProxy、またはローカルPeer）への接続先
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEndpoint {
    /// ホスト名
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// 未知フィールド（前方互換のため保持）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PeerEndpoint {
    /// 追加フィールドなしのピア記述子を作成
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            extra: Map::new(),
        }
    }
}

/// 外部チャットAPIへの接続先と変換設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    /// APIホスト名
    pub host: String,
    /// ポート番号（デフォルト: 443）
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// リクエストパス
    #[serde(default = "default_api_path")]
    pub path: String,
    /// 送信時に付与するHTTPヘッダー
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// クエリパラメータ（Gemini の `key` 等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    /// リクエスト変換の識別子
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_request: Option<String>,
    /// レスポンス変換の識別子
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_response: Option<String>,
    /// タイムアウト（秒）
    #[serde(default = "default_api_timeout")]
    pub timeout: f64,
    /// ベンダーリクエストにそのまま埋め込むモデル設定
    #[serde(default)]
    pub model_config: Map<String, Value>,
    /// 未知フィールド（前方互換のため保持）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_api_port() -> u16 {
    443
}

fn default_api_path() -> String {
    "/".to_string()
}

fn default_api_timeout() -> f64 {
    30.0
}

/// エンドポイント記述子
///
/// ワイヤ上では `is_api: true` を持つレコードが [`ApiEndpoint`]、
/// それ以外が [`PeerEndpoint`] として解釈される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptor", into = "RawDescriptor")]
pub enum EndpointDescriptor {
    /// ピア / Proxy
    Peer(PeerEndpoint),
    /// 外部API
    Api(ApiEndpoint),
}

impl EndpointDescriptor {
    /// ホスト名
    pub fn host(&self) -> &str {
        match self {
            Self::Peer(peer) => &peer.host,
            Self::Api(api) => &api.host,
        }
    }

    /// ポート番号
    pub fn port(&self) -> u16 {
        match self {
            Self::Peer(peer) => peer.port,
            Self::Api(api) => api.port,
        }
    }

    /// 外部API記述子かどうか
    pub fn is_api(&self) -> bool {
        matches!(self, Self::Api(_))
    }
}

#[derive(Serialize, Deserialize)]
struct RawDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_api: Option<bool>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<RawDescriptor> for EndpointDescriptor {
    type Error = String;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        if raw.is_api == Some(true) {
            let api = serde_json::from_value::<ApiEndpoint>(Value::Object(raw.fields))
                .map_err(|e| format!("invalid api endpoint: {e}"))?;
            return Ok(Self::Api(api));
        }

        let mut fields = raw.fields;
        if let Some(flag) = raw.is_api {
            fields.insert("is_api".to_string(), Value::Bool(flag));
        }
        let peer = serde_json::from_value::<PeerEndpoint>(Value::Object(fields))
            .map_err(|e| format!("invalid peer endpoint: {e}"))?;
        Ok(Self::Peer(peer))
    }
}

impl From<EndpointDescriptor> for RawDescriptor {
    fn from(descriptor: EndpointDescriptor) -> Self {
        let (is_api, value) = match descriptor {
            EndpointDescriptor::Peer(peer) => (None, serde_json::to_value(peer)),
            EndpointDescriptor::Api(api) => (Some(true), serde_json::to_value(api)),
        };
        let fields = match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        RawDescriptor { is_api, fields }
    }
}

/// Peer と Proxy の間でやり取りされるメッセージ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// 本文
    #[serde(default)]
    pub message: String,
    /// 送信元インスタンス名
    #[serde(default)]
    pub from: String,
    /// ISO-8601 形式のタイムスタンプ
    #[serde(default)]
    pub timestamp: String,
    /// その他のフィールド（透過的に転送する）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageEnvelope {
    /// 任意のJSONからエンベロープを寛容に読み取る
    ///
    /// フィールドごとに読み、文字列でないものは空文字列として扱う。
    /// オブジェクトでなければ空のエンベロープ。
    pub fn from_value(value: &Value) -> Self {
        let Some(fields) = value.as_object() else {
            return Self::default();
        };
        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            message: text("message"),
            from: text("from"),
            timestamp: text("timestamp"),
            extra: fields
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "message" | "from" | "timestamp"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Coordinator に登録された Proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredProxy {
    /// Proxy が起動時に生成した識別子
    pub proxy_id: String,
    /// インスタンス名
    pub instance_name: String,
    /// Proxy のホスト
    pub host: String,
    /// Proxy のポート
    pub port: u16,
    /// 登録日時
    pub registered_at: DateTime<Utc>,
    /// 最終確認時刻
    pub last_seen: DateTime<Utc>,
    /// エンドポイントテーブル
    pub endpoints: EndpointTable,
}

impl RegisteredProxy {
    /// 最終確認からの経過時間に基づく状態
    pub fn liveness(&self, now: DateTime<Utc>) -> ProxyLiveness {
        ProxyLiveness::from_age_secs((now - self.last_seen).num_seconds())
    }
}

/// Proxy の生存状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyLiveness {
    /// 60秒以内に応答あり
    Active,
    /// 120秒以内に応答あり
    Warning,
    /// 退去対象
    Stale,
}

impl ProxyLiveness {
    /// 経過秒数から状態を判定
    pub fn from_age_secs(age: i64) -> Self {
        match age {
            a if a < 60 => Self::Active,
            a if a < 120 => Self::Warning,
            _ => Self::Stale,
        }
    }
}

/// 一覧表示用の Proxy 情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxySummary {
    /// Proxy 識別子
    pub proxy_id: String,
    /// インスタンス名
    pub instance_name: String,
    /// ホスト
    pub host: String,
    /// ポート
    pub port: u16,
    /// 最終確認時刻
    pub last_seen: DateTime<Utc>,
    /// 生存状態
    pub liveness: ProxyLiveness,
    /// 登録済みターゲット名
    pub targets: Vec<String>,
}
