//! チャットAPI変換レイヤー（ChatTransform trait + 各ベンダー実装）
//!
//! 内部メッセージ形式とベンダー固有のリクエスト/レスポンス形式を相互に変換する。
//! 変換は識別子（`openai_chat` 等）で [`TransformRegistry`] から引く。
//! 未知の識別子は変換なし（そのまま転送）として扱う。

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicChat;
pub use gemini::GeminiChat;
pub use openai::OpenAiChat;

use chatmesh_common::protocol::ResponseStatus;
use chatmesh_common::types::{ApiEndpoint, MessageEnvelope};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// レート制限時に `retry_after` が得られない場合の待機秒数
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const RATE_LIMIT_MESSAGE: &str = "The service is currently busy. Please try again in a moment.";
const MALFORMED_RESPONSE_MESSAGE: &str = "Failed to process API response";

/// 正規化済みの応答（ローカルPeerへ配送される）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// 成否
    pub status: ResponseStatus,
    /// 応答本文、またはエラーメッセージ
    pub message: String,
    /// 送信元ターゲット名（成功時）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// ISO-8601 タイムスタンプ（成功時）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// 自動応答であることを示す
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,
    /// エラー種別（`rate_limit` 等）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// ベンダーのエラーコード
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<Value>,
    /// 再試行までの秒数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// 変換失敗の詳細
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 変換できなかったベンダーの応答
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl ChatReply {
    /// 成功応答
    pub fn success(from: &str, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            from: Some(from.to_string()),
            timestamp: Some(now_timestamp()),
            auto: Some(true),
            error_type: None,
            error_code: None,
            retry_after: None,
            error: None,
            raw_response: None,
        }
    }

    fn error(from: &str, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            from: Some(from.to_string()),
            timestamp: Some(now_timestamp()),
            auto: None,
            error_type: None,
            error_code: None,
            retry_after: None,
            error: None,
            raw_response: None,
        }
    }

    /// 応答の形が想定と異なる場合のエラー
    pub fn malformed(from: &str, detail: impl Into<String>, raw_response: &Value) -> Self {
        Self {
            error: Some(detail.into()),
            raw_response: Some(raw_response.clone()),
            ..Self::error(from, MALFORMED_RESPONSE_MESSAGE)
        }
    }

    /// 成功応答かどうか
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// ベンダー形式との変換戦略
pub trait ChatTransform: Send + Sync {
    /// 変換識別子（エンドポイント記述子の `transform_request` / `transform_response`）
    fn id(&self) -> &'static str;

    /// 応答の `from` に入る送信元名（`BOT` / `ANTHROPIC` / `GEMINI`）
    fn vendor(&self) -> &'static str;

    /// 内部メッセージをベンダーのリクエストボディに変換する
    fn build_request(&self, envelope: &MessageEnvelope, endpoint: &ApiEndpoint) -> Value;

    /// ベンダーの成功レスポンスから応答を取り出す
    ///
    /// エラー形式の検出は [`TransformRegistry::reply`] が先に行う。
    fn parse_response(&self, body: &Value) -> ChatReply;
}

/// 識別子 → 変換戦略
#[derive(Clone)]
pub struct TransformRegistry {
    strategies: HashMap<&'static str, Arc<dyn ChatTransform>>,
}

impl TransformRegistry {
    /// 空のレジストリ
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// 変換戦略を登録（同じ識別子は置き換え）
    pub fn register(&mut self, strategy: Arc<dyn ChatTransform>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    /// 識別子から変換戦略を引く
    pub fn get(&self, id: &str) -> Option<&Arc<dyn ChatTransform>> {
        self.strategies.get(id)
    }

    /// 登録済みの識別子
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.strategies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// ベンダーへ送るリクエストボディ
    ///
    /// `transform_request` が未指定または未登録なら受信したボディをそのまま使う。
    pub fn request_body(&self, endpoint: &ApiEndpoint, body: &Value) -> Value {
        match endpoint
            .transform_request
            .as_deref()
            .and_then(|id| self.get(id))
        {
            Some(strategy) => strategy.build_request(&MessageEnvelope::from_value(body), endpoint),
            None => body.clone(),
        }
    }

    /// ベンダーの応答をローカルPeerへ渡す形に変換する
    ///
    /// `transform_response` が未指定または未登録ならベンダーの応答をそのまま返す。
    pub fn reply(&self, endpoint: &ApiEndpoint, body: Value) -> Value {
        let Some(strategy) = endpoint
            .transform_response
            .as_deref()
            .and_then(|id| self.get(id))
        else {
            return body;
        };

        let reply = detect_vendor_error(&body, strategy.vendor())
            .unwrap_or_else(|| strategy.parse_response(&body));
        serde_json::to_value(&reply).unwrap_or(body)
    }
}

impl Default for TransformRegistry {
    /// 組み込みの OpenAI / Anthropic / Gemini 変換を登録済み
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(OpenAiChat));
        registry.register(Arc::new(AnthropicChat));
        registry.register(Arc::new(GeminiChat));
        registry
    }
}

/// ベンダー共通のエラー形式を検出する
///
/// - OpenAI / Anthropic / Mistral: `{"error": {"type", "message", "code"}}`
/// - Gemini: `{"error": {"code", "status", "message"}}`
///
/// `"error": null` はエラーとして扱わない。
pub fn detect_vendor_error(body: &Value, from: &str) -> Option<ChatReply> {
    let error = body.get("error").filter(|error| !error.is_null())?;
    let Some(fields) = error.as_object() else {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(ChatReply {
            error_type: Some("unknown".to_string()),
            ..ChatReply::error(from, message)
        });
    };

    let error_type = text_field(fields, "type").or_else(|| text_field(fields, "status"));
    let code = fields.get("code").filter(|c| !c.is_null()).cloned();

    if is_rate_limit(error_type.as_deref(), code.as_ref()) {
        let retry_after = fields
            .get("retry_after")
            .and_then(retry_after_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Some(ChatReply {
            error_type: Some("rate_limit".to_string()),
            error_code: code,
            retry_after: Some(retry_after),
            ..ChatReply::error(from, RATE_LIMIT_MESSAGE)
        });
    }

    Some(ChatReply {
        error_type: Some(error_type.unwrap_or_else(|| "unknown".to_string())),
        error_code: Some(code.unwrap_or_else(|| json!("unknown"))),
        ..ChatReply::error(
            from,
            text_field(fields, "message").unwrap_or_else(|| "Unknown API error".to_string()),
        )
    })
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn is_rate_limit(error_type: Option<&str>, code: Option<&Value>) -> bool {
    let by_type = matches!(
        error_type,
        Some("rate_limit_error" | "rate_limit_exceeded" | "RESOURCE_EXHAUSTED")
    );
    let by_code = match code {
        Some(Value::String(code)) => code == "rate_limit_exceeded" || code == "429",
        Some(Value::Number(code)) => code.as_u64() == Some(429),
        _ => false,
    };
    by_type || by_code
}

fn retry_after_secs(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.ceil() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ユーザー発話を1件だけ持つメッセージ配列
pub(crate) fn single_user_turn(envelope: &MessageEnvelope) -> Value {
    json!([{ "role": "user", "content": envelope.message }])
}
