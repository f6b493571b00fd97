//! CLI引数
//!
//! 設定ファイル・環境変数で読み込んだ値を個別に上書きする。

use chatmesh_common::config::CoordinatorConfig;
use clap::Parser;
use std::path::PathBuf;

/// chatmesh coordinator - endpoint registry for chatmesh proxies
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "chatmesh-coordinator")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    CHATMESH_HOST                  Bind address (default: 0.0.0.0)
    CHATMESH_PORT                  Listen port (default: 8000)
    CHATMESH_SWEEP_INTERVAL_SECS   Eviction sweep interval (default: 60)
    CHATMESH_STALE_AFTER_SECS      Evict proxies silent for longer than this (default: 120)
    CHATMESH_SEED_FILE             Seed endpoint table (JSON)
    CHATMESH_LOG_LEVEL             Log level (default: info)
    CHATMESH_LOG_DIR               Write daily-rotated JSON logs to this directory
"#)]
pub struct Cli {
    /// Configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bind address
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seed endpoint table (JSON)
    #[arg(long)]
    pub seed_file: Option<PathBuf>,

    /// Eviction sweep interval in seconds
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Evict proxies silent for longer than this many seconds
    #[arg(long)]
    pub stale_after_secs: Option<u64>,
}

impl Cli {
    /// 指定された引数で設定を上書き
    pub fn apply(&self, config: &mut CoordinatorConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(seed_file) = &self.seed_file {
            config.seed_file = Some(seed_file.clone());
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.sweep_interval_secs = secs;
        }
        if let Some(secs) = self.stale_after_secs {
            config.stale_after_secs = secs;
        }
    }
}
