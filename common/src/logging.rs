//! ロギング初期化ユーティリティ
//!
//! コンソール出力に加え、`CHATMESH_LOG_DIR` が設定されていれば
//! 日次ローテーションのJSONログをファイルへ書き出す。

use crate::error::CommonError;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログレベルを指定する環境変数（`RUST_LOG` が優先）
pub const LOG_LEVEL_ENV: &str = "CHATMESH_LOG_LEVEL";

/// ログファイル出力先ディレクトリを指定する環境変数
pub const LOG_DIR_ENV: &str = "CHATMESH_LOG_DIR";

const DEFAULT_LEVEL: &str = "info";

fn resolve_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    })
}

/// ログファイルのディレクトリ（未設定なら `None`）
pub fn log_dir() -> Option<PathBuf> {
    std::env::var(LOG_DIR_ENV)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

/// グローバルsubscriberを初期化する
///
/// `file_prefix` はローテーションファイル名の接頭辞（例: `chatmesh-proxy.log`）。
/// ファイル出力を有効にした場合は、戻り値のガードを `main` の終了まで保持すること。
pub fn init(file_prefix: &str) -> Result<Option<WorkerGuard>, CommonError> {
    let console_layer = fmt::layer().with_target(true);

    match log_dir() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, &dir, file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().json().with_writer(writer).with_ansi(false);

            tracing_subscriber::registry()
                .with(resolve_filter())
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| CommonError::Config(format!("failed to initialize logging: {e}")))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(resolve_filter())
                .with(console_layer)
                .try_init()
                .map_err(|e| CommonError::Config(format!("failed to initialize logging: {e}")))?;
            Ok(None)
        }
    }
}
