//! 組み込みのデフォルトエンドポイント定義
//!
//! - デフォルト `BOT` 記述子（すべてのテーブルに必ず存在させる）
//! - インスタンス名をキーにした初期エンドポイント（シード）テーブル

use crate::error::CommonError;
use crate::merge::fill_missing;
use crate::types::{
    ApiEndpoint, EndpointDescriptor, EndpointTable, PeerEndpoint, BOT_TARGET,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// 組み込みシードテーブル（JSON）
const BUILTIN_SEEDS: &str = include_str!("../seeds/default_endpoints.json");

/// `BOT` が外部APIとしてディスパッチ可能であるために必要なフィールド
///
/// `model_config` はキー単位で補完するため別扱い。
const BOT_REQUIRED_FIELDS: [&str; 5] = [
    "is_api",
    "path",
    "headers",
    "transform_request",
    "transform_response",
];

/// デフォルト `BOT` のモデル設定
fn default_bot_model_config() -> Map<String, Value> {
    let value = json!({
        "model": "gpt-3.5-turbo",
        "temperature": 0.7,
        "max_tokens": 150,
        "top_p": 1,
        "frequency_penalty": 0,
        "presence_penalty": 0,
        "stream": false
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// デフォルト `BOT` 記述子（OpenAI Chat Completions）
pub fn default_bot_endpoint() -> ApiEndpoint {
    ApiEndpoint {
        host: "api.openai.com".to_string(),
        port: 443,
        path: "/v1/chat/completions".to_string(),
        headers: BTreeMap::from([
            (
                "Authorization".to_string(),
                "Bearer sk-your-default-api-key".to_string(),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]),
        params: None,
        transform_request: Some("openai_chat".to_string()),
        transform_response: Some("openai_chat".to_string()),
        timeout: 30.0,
        model_config: default_bot_model_config(),
        extra: Map::new(),
    }
}

/// `BOT` だけを含むテーブル
pub fn default_bot_table() -> EndpointTable {
    EndpointTable::from([(
        BOT_TARGET.to_string(),
        EndpointDescriptor::Api(default_bot_endpoint()),
    )])
}

/// `BOT` の存在を保証する（型付きテーブル版）
///
/// - 存在しなければデフォルトを追加
/// - ピア記述子であれば host/port を保ったまま外部API記述子に昇格
/// - 既に外部API記述子であれば何もしない
pub fn ensure_bot(table: &mut EndpointTable) {
    match table.remove(BOT_TARGET) {
        Some(EndpointDescriptor::Api(api)) => {
            table.insert(BOT_TARGET.to_string(), EndpointDescriptor::Api(api));
        }
        Some(EndpointDescriptor::Peer(peer)) => {
            table.insert(
                BOT_TARGET.to_string(),
                EndpointDescriptor::Api(promote_peer(peer)),
            );
        }
        None => {
            table.insert(
                BOT_TARGET.to_string(),
                EndpointDescriptor::Api(default_bot_endpoint()),
            );
        }
    }
}

/// ピア記述子のフィールドを優先し、欠けているものだけデフォルト `BOT` から補う
fn promote_peer(peer: PeerEndpoint) -> ApiEndpoint {
    let mut fields = peer.extra;
    fields.remove("is_api");
    fields.insert("host".to_string(), Value::String(peer.host.clone()));
    fields.insert("port".to_string(), Value::from(peer.port));

    if let Ok(Value::Object(defaults)) = serde_json::to_value(default_bot_endpoint()) {
        for (key, value) in defaults {
            fields.entry(key).or_insert(value);
        }
    }
    if let Some(Value::Object(model_config)) = fields.get_mut("model_config") {
        fill_missing(model_config, &default_bot_model_config());
    }

    serde_json::from_value(Value::Object(fields)).unwrap_or_else(|_| ApiEndpoint {
        host: peer.host,
        port: peer.port,
        ..default_bot_endpoint()
    })
}

/// `BOT` の完全性を保証する（マージ直後のJSON版）
///
/// 欠けている API フィールドだけをデフォルトから補完し、`model_config` は
/// キー単位で補完する。既存の値は上書きしない。
pub fn complete_bot_record(endpoints: &mut Map<String, Value>) {
    let default_bot = match serde_json::to_value(EndpointDescriptor::Api(default_bot_endpoint()))
    {
        Ok(Value::Object(map)) => map,
        _ => return,
    };

    let Some(Value::Object(bot)) = endpoints.get_mut(BOT_TARGET) else {
        endpoints.insert(BOT_TARGET.to_string(), Value::Object(default_bot));
        return;
    };

    for key in BOT_REQUIRED_FIELDS {
        if !bot.contains_key(key) {
            if let Some(value) = default_bot.get(key) {
                bot.insert(key.to_string(), value.clone());
            }
        }
    }

    match bot.get_mut("model_config") {
        Some(Value::Object(model_config)) => {
            fill_missing(model_config, &default_bot_model_config());
        }
        Some(_) => {
            // オブジェクト以外はバリデーションで拒否させる
        }
        None => {
            bot.insert(
                "model_config".to_string(),
                Value::Object(default_bot_model_config()),
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeedEntry {
    endpoints: EndpointTable,
}

/// インスタンス名 → 初期エンドポイントテーブル
#[derive(Debug, Clone, Default)]
pub struct SeedTable {
    by_instance: HashMap<String, EndpointTable>,
}

impl SeedTable {
    /// シードなし（全インスタンスがデフォルト `BOT` のみで開始）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 組み込みシードテーブルを読み込む
    pub fn builtin() -> Result<Self, CommonError> {
        Self::from_json_str(BUILTIN_SEEDS)
    }

    /// `{"<instance>": {"endpoints": {...}}}` 形式のJSONから読み込む
    pub fn from_json_str(json: &str) -> Result<Self, CommonError> {
        let entries: HashMap<String, SeedEntry> = serde_json::from_str(json)?;
        Ok(Self {
            by_instance: entries
                .into_iter()
                .map(|(name, entry)| (name, entry.endpoints))
                .collect(),
        })
    }

    /// ファイルから読み込む
    pub fn from_file(path: &Path) -> Result<Self, CommonError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 登録済みインスタンス名
    pub fn instances(&self) -> impl Iterator<Item = &str> {
        self.by_instance.keys().map(String::as_str)
    }

    /// インスタンスのシードが存在するか
    pub fn contains(&self, instance_name: &str) -> bool {
        self.by_instance.contains_key(instance_name)
    }

    /// 登録時の初期テーブル
    ///
    /// シードがあればそのコピー、なければデフォルト `BOT` のみ。
    /// どちらの場合も `BOT` を含むことを保証する。
    pub fn initial_endpoints(&self, instance_name: &str) -> EndpointTable {
        let mut table = self
            .by_instance
            .get(instance_name)
            .cloned()
            .unwrap_or_else(default_bot_table);
        ensure_bot(&mut table);
        table
    }
}
