//! 設定管理
//!
//! CoordinatorConfig, ProxyConfig等の設定構造体
//!
//! 読み込み順序: デフォルト値 → 設定ファイル（任意） → `CHATMESH_*` 環境変数

use crate::error::CommonError;
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 環境変数のプレフィックス
pub const ENV_PREFIX: &str = "CHATMESH";

/// デフォルト値 → ファイル → 環境変数の順に重ねて読み込む
fn load_layered<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, CommonError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        if !path.exists() {
            return Err(CommonError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    }
    let settings = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()?;
    Ok(settings.try_deserialize()?)
}

fn require_nonzero(name: &str, value: u64) -> Result<(), CommonError> {
    if value == 0 {
        return Err(CommonError::Config(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(())
}

/// Coordinator設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// ホストアドレス (デフォルト: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// ポート番号 (デフォルト: 8000)
    #[serde(default = "default_coordinator_port")]
    pub port: u16,

    /// 退去スイープ間隔（秒）(デフォルト: 60)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// この秒数を超えて応答のないProxyを退去 (デフォルト: 120)
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// シードテーブルのJSONファイル（未指定なら組み込みシード）
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_coordinator_port() -> u16 {
    8000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    120
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_coordinator_port(),
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
            seed_file: None,
        }
    }
}

impl CoordinatorConfig {
    /// 設定ファイルと環境変数から読み込む
    pub fn load(path: Option<&Path>) -> Result<Self, CommonError> {
        load_layered(path)
    }

    /// 起動に必要な値が妥当か確認
    pub fn validate(&self) -> Result<(), CommonError> {
        require_nonzero("sweep_interval_secs", self.sweep_interval_secs)
    }

    /// 退去スイープ間隔
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 退去しきい値
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Proxy設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// インスタンス名（必須）
    #[serde(default)]
    pub instance_name: String,

    /// Proxyの待ち受けポート (デフォルト: 8080)
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// ローカルPeerのポート (デフォルト: 5000)
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// CoordinatorのURL (デフォルト: "http://127.0.0.1:8000")
    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Coordinatorに通知する自ホスト (デフォルト: "127.0.0.1")
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,

    /// ハートビート送信間隔（秒）(デフォルト: 30)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// エンドポイント同期間隔（秒）(デフォルト: 60)
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// 同期失敗時のリトライ間隔（秒）(デフォルト: 5)
    #[serde(default = "default_sync_retry_delay")]
    pub sync_retry_delay_secs: u64,

    /// 同期失敗時の最大リトライ回数 (デフォルト: 3)
    #[serde(default = "default_sync_max_retries")]
    pub sync_max_retries: u32,

    /// 同時に処理する配送の上限 (デフォルト: 64)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// ピア / Proxy / Coordinator へのリクエストタイムアウト（秒）(デフォルト: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_proxy_port() -> u16 {
    8080
}

fn default_client_port() -> u16 {
    5000
}

fn default_controller_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_advertise_host() -> String {
    "127.0.0.1".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_sync_interval() -> u64 {
    60
}

fn default_sync_retry_delay() -> u64 {
    5
}

fn default_sync_max_retries() -> u32 {
    3
}

fn default_max_in_flight() -> usize {
    64
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            proxy_port: default_proxy_port(),
            client_port: default_client_port(),
            controller_url: default_controller_url(),
            advertise_host: default_advertise_host(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            sync_interval_secs: default_sync_interval(),
            sync_retry_delay_secs: default_sync_retry_delay(),
            sync_max_retries: default_sync_max_retries(),
            max_in_flight: default_max_in_flight(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ProxyConfig {
    /// 設定ファイルと環境変数から読み込む
    pub fn load(path: Option<&Path>) -> Result<Self, CommonError> {
        load_layered(path)
    }

    /// 起動に必要な値が揃っているか確認
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.instance_name.trim().is_empty() {
            return Err(CommonError::Config(
                "instance_name is required".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(CommonError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        require_nonzero("heartbeat_interval_secs", self.heartbeat_interval_secs)?;
        require_nonzero("sync_interval_secs", self.sync_interval_secs)?;
        Ok(())
    }

    /// ハートビート送信間隔
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// エンドポイント同期間隔
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// 同期リトライ間隔
    pub fn sync_retry_delay(&self) -> Duration {
        Duration::from_secs(self.sync_retry_delay_secs)
    }

    /// リクエストタイムアウト
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
