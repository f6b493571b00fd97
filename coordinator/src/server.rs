//! axumサーバー起動・シャットダウンハンドリング

use crate::AppState;
use chatmesh_common::shutdown::shutdown_signal;
use chatmesh_common::tasks::BackgroundTasks;
use tracing::info;

/// axumサーバーを起動し、シャットダウンシグナルを待機する
///
/// サーバー停止後にバックグラウンドタスクを中断する。
pub async fn run(state: AppState, bind_addr: &str, tasks: BackgroundTasks) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = crate::api::create_app(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("chatmesh coordinator listening on {}", bind_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    tasks.shutdown().await;
    info!("Server shutdown complete");
    result
}
