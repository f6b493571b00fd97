//! 配送（ローカルPeer / 外部API / 他Proxy）
//!
//! 配送は呼び出し元に結果を返さない。上限付きのタスク集合で実行し、
//! 失敗はログに記録して破棄する（再送しない）。

use crate::identity::ProxyIdentity;
use crate::routing::Route;
use crate::transform::TransformRegistry;
use chatmesh_common::{
    error::{MeshError, MeshResult},
    protocol::{AckResponse, DESTINATION_HEADER},
    types::{ApiEndpoint, PeerEndpoint},
};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

/// 同時実行数に上限のあるfire-and-forgetタスク集合
#[derive(Clone)]
pub struct DispatchPool {
    tasks: Arc<Mutex<JoinSet<()>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl DispatchPool {
    /// 上限を指定して作成
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 実行中の配送数
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.permits.available_permits())
    }

    /// 配送を開始する
    ///
    /// 上限に達している場合は [`MeshError::ServiceUnavailable`]。
    pub fn spawn<F>(&self, future: F) -> MeshResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            MeshError::ServiceUnavailable("Too many deliveries in flight".to_string())
        })?;

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| MeshError::Internal("dispatch pool lock poisoned".to_string()))?;
        // 完了済みタスクを回収
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let _permit = permit;
            future.await;
        });
        Ok(())
    }

    /// 未完了の配送をすべて中断する（完了は待たない）
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            let pending = tasks.len();
            tasks.abort_all();
            if pending > 0 {
                info!(pending, "Aborted outstanding deliveries");
            }
        }
    }
}

/// 経路ごとの配送処理
#[derive(Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    identity: Arc<ProxyIdentity>,
    transforms: Arc<TransformRegistry>,
    pool: DispatchPool,
    api_scheme: &'static str,
}

impl Dispatcher {
    /// 新しいディスパッチャーを作成
    ///
    /// `request_timeout` はローカルPeerと他Proxyへの送信に使う。
    /// 外部APIには記述子の `timeout` を使う。
    pub fn new(
        identity: Arc<ProxyIdentity>,
        transforms: TransformRegistry,
        pool: DispatchPool,
        request_timeout: Duration,
    ) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MeshError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            identity,
            transforms: Arc::new(transforms),
            pool,
            api_scheme: "https",
        })
    }

    /// 外部APIのスキームを変更する（既定は https）
    pub fn with_api_scheme(mut self, scheme: &'static str) -> Self {
        self.api_scheme = scheme;
        self
    }

    /// 配送タスク集合
    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    /// 経路に応じて配送を開始し、受付結果を返す
    pub fn dispatch(&self, route: Route, body: Value) -> MeshResult<AckResponse> {
        let kind = route.kind();
        let this = self.clone();
        let span = tracing::info_span!("deliver", route = kind);

        let message = match &route {
            Route::Local => "Message scheduled for local peer".to_string(),
            Route::Api { target, .. } => format!("Request sent to API {target}"),
            Route::Remote { target, .. } => format!("Message sent to peer proxy {target}"),
        };

        self.pool.spawn(
            async move {
                let started = Instant::now();
                let result = match route {
                    Route::Local => this.deliver_local(&body).await,
                    Route::Api { target, endpoint } => {
                        this.dispatch_api(&target, &endpoint, &body).await
                    }
                    Route::Remote { target, endpoint } => {
                        this.forward_remote(&target, &endpoint, &body).await
                    }
                };
                match result {
                    Ok(()) => debug!(
                        latency_ms = started.elapsed().as_millis() as u64,
                        "Delivery completed"
                    ),
                    Err(e) => warn!(error = %e, "Delivery failed"),
                }
            }
            .instrument(span),
        )?;

        Ok(AckResponse::success(message))
    }

    /// ローカルPeerへ配送
    pub async fn deliver_local(&self, body: &Value) -> MeshResult<()> {
        let url = self.identity.peer_sink_url();
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MeshError::Transport(format!("local peer {url}: {e}")))?;
        expect_success(&url, response.status().as_u16())?;
        info!(instance = %self.identity.instance_name, "Delivered message to local peer");
        Ok(())
    }

    /// 外部APIを呼び出し、正規化した応答をローカルPeerへ配送
    pub async fn dispatch_api(
        &self,
        target: &str,
        endpoint: &ApiEndpoint,
        body: &Value,
    ) -> MeshResult<()> {
        let url = api_url(self.api_scheme, endpoint);
        let request_body = self.transforms.request_body(endpoint, body);

        let mut request = self.http.post(&url).timeout(api_timeout(endpoint.timeout));
        for (name, value) in &endpoint.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(params) = &endpoint.params {
            request = request.query(params);
        }
        // 記述子に Content-Type があればそちらが使われる
        let request = request.json(&request_body);

        let response = request
            .send()
            .await
            .map_err(|e| MeshError::Transport(format!("api {target}: {e}")))?;
        let status = response.status().as_u16();
        if status != 200 {
            let detail = response.text().await.unwrap_or_default();
            return Err(MeshError::Transport(format!(
                "api {target} returned {status}: {}",
                detail.trim()
            )));
        }

        let vendor_body: Value = response
            .json()
            .await
            .map_err(|e| MeshError::UpstreamTransform(format!("api {target}: {e}")))?;
        let reply = self.transforms.reply(endpoint, vendor_body);
        info!(destination = %target, "Received API response");

        self.deliver_local(&reply).await
    }

    /// 他インスタンスのProxyへ転送
    pub async fn forward_remote(
        &self,
        target: &str,
        endpoint: &PeerEndpoint,
        body: &Value,
    ) -> MeshResult<()> {
        let url = format!("http://{}:{}/", endpoint.host, endpoint.port);
        let response = self
            .http
            .post(&url)
            .header(DESTINATION_HEADER, target)
            .header(reqwest::header::HOST, target)
            .json(body)
            .send()
            .await
            .map_err(|e| MeshError::Transport(format!("peer proxy {url}: {e}")))?;
        expect_success(&url, response.status().as_u16())?;
        info!(destination = %target, proxy = %url, "Forwarded message to peer proxy");
        Ok(())
    }
}

fn expect_success(url: &str, status: u16) -> MeshResult<()> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(MeshError::Transport(format!("{url} returned {status}")))
    }
}

/// 外部APIのURL（既定ポートは省略）
pub fn api_url(scheme: &str, endpoint: &ApiEndpoint) -> String {
    let default_port = match scheme {
        "http" => 80,
        _ => 443,
    };
    let port = if endpoint.port == default_port {
        String::new()
    } else {
        format!(":{}", endpoint.port)
    };
    let path = if endpoint.path.starts_with('/') {
        endpoint.path.clone()
    } else {
        format!("/{}", endpoint.path)
    };
    format!("{scheme}://{}{port}{path}", endpoint.host)
}

fn api_timeout(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(30))
}
