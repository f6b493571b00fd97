//! 宛先の解決と分類
//!
//! 1. 解決: 完全一致 → 大文字小文字を無視した一致 → 自インスタンス名ならローカルPeer
//! 2. 分類: 自インスタンス宛て → ローカル配送、外部API → API呼び出し、それ以外 → 他Proxyへ転送
//!
//! どちらもスナップショットだけを参照し、ネットワークには触れない。

use crate::identity::ProxyIdentity;
use chatmesh_common::error::{MeshError, MeshResult};
use chatmesh_common::types::{ApiEndpoint, EndpointDescriptor, EndpointTable, PeerEndpoint};

/// 配送経路
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// ローカルPeerへ配送
    Local,
    /// 外部APIを呼び出し、応答をローカルPeerへ配送
    Api {
        /// テーブル上のターゲット名
        target: String,
        /// API記述子
        endpoint: ApiEndpoint,
    },
    /// 他インスタンスのProxyへ転送
    Remote {
        /// 元の宛先名（転送先でも同じ名前で解決される）
        target: String,
        /// 転送先Proxy
        endpoint: PeerEndpoint,
    },
}

impl Route {
    /// ログ用の経路名
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Local => "local",
            Route::Api { .. } => "api",
            Route::Remote { .. } => "remote",
        }
    }
}

/// 宛先名からエンドポイント記述子を解決する
///
/// 戻り値のターゲット名はテーブル上の表記。
pub fn resolve(
    table: &EndpointTable,
    identity: &ProxyIdentity,
    target: &str,
) -> MeshResult<(String, EndpointDescriptor)> {
    if target.is_empty() {
        return Err(MeshError::UnknownTarget(String::new()));
    }

    if let Some(descriptor) = table.get(target) {
        return Ok((target.to_string(), descriptor.clone()));
    }

    if let Some((name, descriptor)) = table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(target))
    {
        return Ok((name.clone(), descriptor.clone()));
    }

    if identity.is_self(target) {
        return Ok((
            identity.instance_name.clone(),
            EndpointDescriptor::Peer(identity.local_peer()),
        ));
    }

    Err(MeshError::UnknownTarget(target.to_string()))
}

/// 解決済みの記述子から配送経路を決める
pub fn classify(identity: &ProxyIdentity, target: &str, descriptor: EndpointDescriptor) -> Route {
    if identity.is_self(target) {
        return Route::Local;
    }
    match descriptor {
        EndpointDescriptor::Api(endpoint) => Route::Api {
            target: target.to_string(),
            endpoint,
        },
        EndpointDescriptor::Peer(endpoint) => Route::Remote {
            target: target.to_string(),
            endpoint,
        },
    }
}

/// 解決と分類をまとめて行う
pub fn route_for(table: &EndpointTable, identity: &ProxyIdentity, target: &str) -> MeshResult<Route> {
    let (_, descriptor) = resolve(table, identity, target)?;
    Ok(classify(identity, target, descriptor))
}
