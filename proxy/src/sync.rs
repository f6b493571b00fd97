//! Coordinatorとの同期（登録・ハートビート・エンドポイント取得）
//!
//! - ハートビート: 一定間隔で送信。Coordinatorが登録を知らなければ再登録する
//! - エンドポイント同期: 一定間隔で取得。失敗時は短い間隔で数回だけ再試行し、
//!   それでも失敗した場合は通常の間隔に戻る。既存のスナップショットは捨てない

use crate::client::ControllerClient;
use crate::identity::ProxyIdentity;
use crate::snapshot::EndpointSnapshot;
use chatmesh_common::error::{MeshError, MeshResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Coordinatorへ登録し、返されたテーブルでスナップショットを置き換える
pub async fn register(
    client: &ControllerClient,
    identity: &ProxyIdentity,
    snapshot: &EndpointSnapshot,
) -> MeshResult<()> {
    info!(
        proxy_id = %identity.proxy_id,
        controller = client.base_url(),
        "Registering with coordinator"
    );
    let endpoints = client.register(&identity.register_request()).await?;
    let targets = endpoints.len();
    snapshot.replace(endpoints).await;
    info!(targets, "Registered with coordinator");
    Ok(())
}

/// ハートビート送信
#[derive(Clone)]
pub struct Heartbeat {
    client: ControllerClient,
    identity: Arc<ProxyIdentity>,
    snapshot: EndpointSnapshot,
    interval: Duration,
}

impl Heartbeat {
    /// 新しいハートビート送信を作成
    pub fn new(
        client: ControllerClient,
        identity: Arc<ProxyIdentity>,
        snapshot: EndpointSnapshot,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            identity,
            snapshot,
            interval,
        }
    }

    /// 1回分のハートビート
    pub async fn beat_once(&self) -> MeshResult<()> {
        match self.client.heartbeat(&self.identity.proxy_id).await {
            Ok(()) => {
                debug!("Heartbeat acknowledged");
                Ok(())
            }
            Err(MeshError::ProxyNotFound(_)) => {
                warn!("Coordinator does not know this proxy, re-registering");
                register(&self.client, &self.identity, &self.snapshot).await
            }
            Err(e) => Err(e),
        }
    }

    /// バックグラウンドで送信を開始
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Heartbeat started");

            // 登録直後なので初回のtickは読み捨てる
            timer.tick().await;

            loop {
                timer.tick().await;
                if let Err(e) = self.beat_once().await {
                    error!(error = %e, "Heartbeat failed");
                }
            }
        })
    }
}

/// エンドポイント同期
#[derive(Clone)]
pub struct EndpointSync {
    client: ControllerClient,
    identity: Arc<ProxyIdentity>,
    snapshot: EndpointSnapshot,
    interval: Duration,
    retry_delay: Duration,
    max_retries: u32,
}

impl EndpointSync {
    /// 新しい同期を作成
    pub fn new(
        client: ControllerClient,
        identity: Arc<ProxyIdentity>,
        snapshot: EndpointSnapshot,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            identity,
            snapshot,
            interval,
            retry_delay: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    /// 失敗時の再試行間隔と回数を設定
    pub fn with_retry(mut self, retry_delay: Duration, max_retries: u32) -> Self {
        self.retry_delay = retry_delay;
        self.max_retries = max_retries;
        self
    }

    async fn fetch_once(&self) -> MeshResult<()> {
        let endpoints = self.client.fetch_endpoints(&self.identity.proxy_id).await?;
        if endpoints.is_empty() {
            return Err(MeshError::Transport(
                "coordinator returned an empty endpoint table".to_string(),
            ));
        }
        let diff = self.snapshot.replace(endpoints).await;
        if diff.is_empty() {
            debug!("Endpoint table unchanged");
        }
        Ok(())
    }

    /// 取得を試み、失敗したら `max_retries` 回まで再試行する
    ///
    /// 成功すれば `true`。失敗してもスナップショットは変更しない。
    pub async fn sync_with_retry(&self) -> bool {
        let mut attempt = 0;
        loop {
            match self.fetch_once().await {
                Ok(()) => return true,
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries = self.max_retries, "Endpoint sync failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(error = %e, "Endpoint sync failed, keeping previous snapshot");
                    return false;
                }
            }
        }
    }

    /// バックグラウンドで同期を開始
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Endpoint sync started");
            loop {
                self.sync_with_retry().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}
