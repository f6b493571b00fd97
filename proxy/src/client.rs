//! Coordinator APIクライアント

use chatmesh_common::{
    error::{MeshError, MeshResult},
    protocol::{EndpointsResponse, HeartbeatRequest, RegisterRequest},
    types::EndpointTable,
};
use std::time::Duration;

/// Coordinatorへのリクエストを行うクライアント
#[derive(Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ControllerClient {
    /// 新しいクライアントを作成
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// CoordinatorのベースURL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Proxyを登録し、初期エンドポイントテーブルを受け取る
    pub async fn register(&self, request: &RegisterRequest) -> MeshResult<EndpointTable> {
        let response = self
            .http
            .post(format!("{}/api/register", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let body: EndpointsResponse = check_status(response, &request.proxy_id)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.endpoints)
    }

    /// ハートビートを送信
    ///
    /// Coordinatorが登録を知らない場合は [`MeshError::ProxyNotFound`]。
    pub async fn heartbeat(&self, proxy_id: &str) -> MeshResult<()> {
        let response = self
            .http
            .post(format!("{}/api/heartbeat", self.base_url))
            .json(&HeartbeatRequest {
                proxy_id: proxy_id.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        check_status(response, proxy_id).await?;
        Ok(())
    }

    /// 最新のエンドポイントテーブルを取得
    pub async fn fetch_endpoints(&self, proxy_id: &str) -> MeshResult<EndpointTable> {
        let response = self
            .http
            .get(format!("{}/api/getendpoints", self.base_url))
            .query(&[("proxy_id", proxy_id)])
            .send()
            .await
            .map_err(transport)?;
        let body: EndpointsResponse = check_status(response, proxy_id)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.endpoints)
    }
}

fn transport(err: reqwest::Error) -> MeshError {
    MeshError::Transport(err.to_string())
}

async fn check_status(response: reqwest::Response, proxy_id: &str) -> MeshResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 404 {
        return Err(MeshError::ProxyNotFound(proxy_id.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(MeshError::Transport(format!(
        "coordinator returned {}: {}",
        status.as_u16(),
        body.trim()
    )))
}
