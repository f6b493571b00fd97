//! chatmesh Proxy
//!
//! インスタンスごとのルーター。Coordinatorからエンドポイントテーブルを同期し、
//! 受信したメッセージをローカルPeer・他インスタンスのProxy・外部チャットAPIへ振り分ける。

#![warn(missing_docs)]

/// Proxy HTTP API
pub mod api;

/// CLI引数
pub mod cli;

/// Coordinator APIクライアント
pub mod client;

/// 配送
pub mod dispatch;

/// Proxy自身の識別情報
pub mod identity;

/// 宛先の解決と分類
pub mod routing;

/// axumサーバー起動・シャットダウンハンドリング
pub mod server;

/// エンドポイントテーブルのローカルスナップショット
pub mod snapshot;

/// Coordinatorとの同期
pub mod sync;

/// チャットAPI変換レイヤー
pub mod transform;

use chatmesh_common::shutdown::ShutdownController;
use std::sync::Arc;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// 自インスタンスの識別情報
    pub identity: Arc<identity::ProxyIdentity>,
    /// エンドポイントスナップショット
    pub snapshot: snapshot::EndpointSnapshot,
    /// 配送
    pub dispatcher: dispatch::Dispatcher,
    /// シャットダウン制御
    pub shutdown: ShutdownController,
}
