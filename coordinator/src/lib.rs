//! chatmesh Coordinator
//!
//! 各インスタンスのProxyを登録し、エンドポイントテーブルを配布する中央サーバー

#![warn(missing_docs)]

/// REST APIハンドラー
pub mod api;

/// CLI引数
pub mod cli;

/// 退去スイープ
pub mod health;

/// Proxy登録管理
pub mod registry;

/// axumサーバー起動・シャットダウンハンドリング
pub mod server;

use chatmesh_common::shutdown::ShutdownController;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// Proxyレジストリ
    pub registry: registry::ProxyRegistry,
    /// シャットダウン制御
    pub shutdown: ShutdownController,
}

impl AppState {
    /// レジストリから状態を作成
    pub fn new(registry: registry::ProxyRegistry) -> Self {
        Self {
            registry,
            shutdown: ShutdownController::default(),
        }
    }
}
