//! axumサーバー起動・シャットダウンハンドリング

use crate::AppState;
use chatmesh_common::shutdown::shutdown_signal;
use chatmesh_common::tasks::BackgroundTasks;
use tracing::info;

/// axumサーバーを起動し、シャットダウンシグナルを待機する
///
/// 停止後はバックグラウンドタスクを中断して終了を待ち、未完了の配送は待たずに中断する。
pub async fn run(state: AppState, bind_addr: &str, tasks: BackgroundTasks) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let pool = state.dispatcher.pool().clone();
    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("chatmesh proxy listening on {}", bind_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    tasks.shutdown().await;
    pool.shutdown();
    info!("Server shutdown complete");
    result
}
