//! エンドポイントテーブルの再帰マージ
//!
//! 両側がレコード（JSONオブジェクト）の場合のみ再帰し、それ以外は更新側で置き換える。

use serde_json::{Map, Value};

/// `update` を `base` に再帰的にマージする
///
/// - 両方がオブジェクトのキーはさらにマージ
/// - それ以外（スカラー、配列、null、型の不一致）は更新側で置き換え
pub fn deep_merge(base: &mut Value, update: Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            merge_maps(base_map, update_map);
        }
        (base, update) => *base = update,
    }
}

/// オブジェクト同士のマージ（トップレベルのキー単位）
pub fn merge_maps(base: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        let both_records = value.is_object() && base.get(&key).is_some_and(Value::is_object);
        if both_records {
            if let Some(existing) = base.get_mut(&key) {
                deep_merge(existing, value);
            }
        } else {
            base.insert(key, value);
        }
    }
}

/// `base` に存在しないキーだけを `defaults` から補完する
///
/// 既存の値は一切上書きしない。
pub fn fill_missing(base: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, value) in defaults {
        if !base.contains_key(key) {
            base.insert(key.clone(), value.clone());
        }
    }
}
