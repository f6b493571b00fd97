//! chatmesh 共通ライブラリ
//!
//! Coordinator と Proxy の間で共有する型・プロトコル・エラー・設定

#![warn(missing_docs)]

/// 設定管理
pub mod config;

/// 組み込みのデフォルトエンドポイント定義
pub mod defaults;

/// エラー型定義
pub mod error;

/// ロギング初期化ユーティリティ
pub mod logging;

/// エンドポイントテーブルの再帰マージ
pub mod merge;

/// Coordinator↔Proxy 間の通信プロトコル
pub mod protocol;

/// Cooperative shutdown controller
pub mod shutdown;

/// バックグラウンドタスク管理
pub mod tasks;

/// 共通型定義
pub mod types;
