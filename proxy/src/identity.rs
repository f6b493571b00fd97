//! Proxy自身の識別情報

use chatmesh_common::{config::ProxyConfig, protocol::RegisterRequest, types::PeerEndpoint};
use uuid::Uuid;

/// ローカルPeerのホスト
pub const LOCAL_PEER_HOST: &str = "127.0.0.1";

/// 起動時に決まり、プロセスの生存中は変わらない識別情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    /// 起動時に生成したUUID v4
    pub proxy_id: String,
    /// インスタンス名
    pub instance_name: String,
    /// Coordinatorに通知するホスト
    pub advertise_host: String,
    /// Proxyの待ち受けポート
    pub proxy_port: u16,
    /// ローカルPeerのポート
    pub client_port: u16,
}

impl ProxyIdentity {
    /// 設定から識別情報を作成（proxy_idは新規生成）
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            proxy_id: Uuid::new_v4().to_string(),
            instance_name: config.instance_name.clone(),
            advertise_host: config.advertise_host.clone(),
            proxy_port: config.proxy_port,
            client_port: config.client_port,
        }
    }

    /// 自インスタンス宛てかどうか（大文字小文字を区別しない）
    pub fn is_self(&self, target: &str) -> bool {
        target.eq_ignore_ascii_case(&self.instance_name)
    }

    /// ローカルPeerの接続先
    pub fn local_peer(&self) -> PeerEndpoint {
        PeerEndpoint::new(LOCAL_PEER_HOST, self.client_port)
    }

    /// ローカルPeerのメッセージ受信URL
    pub fn peer_sink_url(&self) -> String {
        format!("http://{}:{}/message", LOCAL_PEER_HOST, self.client_port)
    }

    /// Coordinatorへの登録リクエスト
    pub fn register_request(&self) -> RegisterRequest {
        RegisterRequest {
            proxy_id: self.proxy_id.clone(),
            instance_name: self.instance_name.clone(),
            host: self.advertise_host.clone(),
            port: Some(self.proxy_port),
        }
    }
}
