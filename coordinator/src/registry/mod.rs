//! Proxy登録管理
//!
//! 登録済みProxyとそのエンドポイントテーブルをメモリ内で管理する。
//! すべての操作は単一のロック区間で完結し、部分的な更新が観測されることはない。

use chatmesh_common::{
    defaults::{complete_bot_record, ensure_bot, SeedTable},
    error::{MeshError, MeshResult},
    merge::merge_maps,
    protocol::RegisterRequest,
    types::{EndpointTable, ProxySummary, RegisteredProxy},
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Proxyレジストリ
#[derive(Clone)]
pub struct ProxyRegistry {
    proxies: Arc<RwLock<HashMap<String, RegisteredProxy>>>,
    seeds: Arc<SeedTable>,
}

impl ProxyRegistry {
    /// シードテーブルを指定してレジストリを作成
    pub fn new(seeds: SeedTable) -> Self {
        Self {
            proxies: Arc::new(RwLock::new(HashMap::new())),
            seeds: Arc::new(seeds),
        }
    }

    /// Proxyを登録（同じproxy_idの場合は置き換え）
    pub async fn register(&self, req: RegisterRequest) -> MeshResult<EndpointTable> {
        let port = req.validate()?;
        let endpoints = self.seeds.initial_endpoints(&req.instance_name);
        let now = Utc::now();

        let mut proxies = self.proxies.write().await;
        let replaced = proxies
            .insert(
                req.proxy_id.clone(),
                RegisteredProxy {
                    proxy_id: req.proxy_id.clone(),
                    instance_name: req.instance_name.clone(),
                    host: req.host.clone(),
                    port,
                    registered_at: now,
                    last_seen: now,
                    endpoints: endpoints.clone(),
                },
            )
            .is_some();

        info!(
            proxy_id = %req.proxy_id,
            instance = %req.instance_name,
            host = %req.host,
            port,
            replaced,
            targets = endpoints.len(),
            "Proxy registered"
        );
        Ok(endpoints)
    }

    /// エンドポイントテーブルを取得し、最終確認時刻を更新
    pub async fn get_endpoints(&self, proxy_id: &str) -> MeshResult<EndpointTable> {
        let mut proxies = self.proxies.write().await;
        let proxy = proxies
            .get_mut(proxy_id)
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))?;

        proxy.last_seen = Utc::now();
        ensure_bot(&mut proxy.endpoints);
        Ok(proxy.endpoints.clone())
    }

    /// エンドポイントテーブルを部分更新
    ///
    /// 再帰マージ → `BOT` 補完 → 検証 → 保存 を1つの書き込みロック内で行う。
    /// 検証に失敗した場合、保存済みのテーブルは変更されない。
    pub async fn update_endpoints(
        &self,
        proxy_id: &str,
        update: Map<String, Value>,
    ) -> MeshResult<EndpointTable> {
        let mut proxies = self.proxies.write().await;
        let proxy = proxies
            .get_mut(proxy_id)
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))?;

        let mut merged = match serde_json::to_value(&proxy.endpoints) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(MeshError::Internal(e.to_string())),
        };
        merge_maps(&mut merged, update);
        complete_bot_record(&mut merged);

        let mut endpoints: EndpointTable = serde_json::from_value(Value::Object(merged))
            .map_err(|e| MeshError::Validation(format!("Invalid endpoint table: {e}")))?;
        ensure_bot(&mut endpoints);

        proxy.endpoints = endpoints.clone();
        info!(
            proxy_id,
            instance = %proxy.instance_name,
            targets = endpoints.len(),
            "Proxy endpoints updated"
        );
        Ok(endpoints)
    }

    /// 最終確認時刻を更新
    pub async fn heartbeat(&self, proxy_id: &str) -> MeshResult<()> {
        let mut proxies = self.proxies.write().await;
        let proxy = proxies
            .get_mut(proxy_id)
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))?;
        proxy.last_seen = Utc::now();
        debug!(proxy_id, instance = %proxy.instance_name, "Heartbeat received");
        Ok(())
    }

    /// Proxyを削除
    pub async fn remove(&self, proxy_id: &str) -> MeshResult<RegisteredProxy> {
        let mut proxies = self.proxies.write().await;
        let removed = proxies
            .remove(proxy_id)
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))?;
        info!(proxy_id, instance = %removed.instance_name, "Proxy removed");
        Ok(removed)
    }

    /// Proxyを取得
    pub async fn get(&self, proxy_id: &str) -> MeshResult<RegisteredProxy> {
        let proxies = self.proxies.read().await;
        proxies
            .get(proxy_id)
            .cloned()
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))
    }

    /// 全Proxyの概要（インスタンス名順）
    pub async fn list(&self) -> Vec<ProxySummary> {
        let now = Utc::now();
        let proxies = self.proxies.read().await;
        let mut summaries: Vec<ProxySummary> = proxies
            .values()
            .map(|proxy| ProxySummary {
                proxy_id: proxy.proxy_id.clone(),
                instance_name: proxy.instance_name.clone(),
                host: proxy.host.clone(),
                port: proxy.port,
                last_seen: proxy.last_seen,
                liveness: proxy.liveness(now),
                targets: proxy.endpoints.keys().cloned().collect(),
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.instance_name
                .cmp(&b.instance_name)
                .then_with(|| a.proxy_id.cmp(&b.proxy_id))
        });
        summaries
    }

    /// 登録数
    pub async fn len(&self) -> usize {
        self.proxies.read().await.len()
    }

    /// 登録がないか
    pub async fn is_empty(&self) -> bool {
        self.proxies.read().await.is_empty()
    }

    /// `stale_after` を超えて応答のないProxyを削除し、削除したproxy_idを返す
    pub async fn evict_stale(&self, stale_after: Duration) -> Vec<String> {
        let limit_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
        let now = Utc::now();

        let mut proxies = self.proxies.write().await;
        let stale: Vec<String> = proxies
            .values()
            .filter(|proxy| (now - proxy.last_seen).num_milliseconds() > limit_ms)
            .map(|proxy| proxy.proxy_id.clone())
            .collect();

        for proxy_id in &stale {
            if let Some(proxy) = proxies.remove(proxy_id) {
                info!(
                    proxy_id = %proxy_id,
                    instance = %proxy.instance_name,
                    last_seen = %proxy.last_seen,
                    "Evicted stale proxy"
                );
            }
        }
        stale
    }

    /// 最終確認時刻を任意の値に書き換える（テスト用）
    #[cfg(test)]
    pub(crate) async fn set_last_seen(
        &self,
        proxy_id: &str,
        last_seen: chrono::DateTime<Utc>,
    ) -> MeshResult<()> {
        let mut proxies = self.proxies.write().await;
        let proxy = proxies
            .get_mut(proxy_id)
            .ok_or_else(|| MeshError::ProxyNotFound(proxy_id.to_string()))?;
        proxy.last_seen = last_seen;
        Ok(())
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new(SeedTable::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmesh_common::defaults::default_bot_endpoint;
    use chatmesh_common::types::{EndpointDescriptor, PeerEndpoint, ProxyLiveness, BOT_TARGET};
    use serde_json::json;

    fn register_request(proxy_id: &str, instance_name: &str) -> RegisterRequest {
        RegisterRequest {
            proxy_id: proxy_id.to_string(),
            instance_name: instance_name.to_string(),
            host: "127.0.0.1".to_string(),
            port: Some(8081),
        }
    }

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn builtin_registry() -> ProxyRegistry {
        ProxyRegistry::new(SeedTable::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_register_seeds_from_instance_name() {
        let registry = builtin_registry();

        let endpoints = registry
            .register(register_request("p1", "behrooz"))
            .await
            .unwrap();
        assert!(endpoints.contains_key("alice"));
        assert!(endpoints.contains_key("ANTHROPIC"));
        assert!(endpoints.contains_key(BOT_TARGET));

        let endpoints = registry
            .register(register_request("p2", "zed"))
            .await
            .unwrap();
        assert_eq!(endpoints.keys().collect::<Vec<_>>(), vec![BOT_TARGET]);
    }

    #[tokio::test]
    async fn test_register_twice_replaces_instance_name() {
        let registry = builtin_registry();

        let first = registry
            .register(register_request("p1", "alice"))
            .await
            .unwrap();
        let second = registry
            .register(register_request("p1", "bob"))
            .await
            .unwrap();

        assert!(first.contains_key(BOT_TARGET));
        assert!(second.contains_key(BOT_TARGET));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("p1").await.unwrap().instance_name, "bob");
    }

    #[tokio::test]
    async fn test_register_rejects_missing_fields() {
        let registry = ProxyRegistry::default();
        let mut request = register_request("p1", "alice");
        request.port = None;

        let err = registry.register(request).await.unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_proxy_is_not_found() {
        let registry = ProxyRegistry::default();

        assert!(registry.get_endpoints("ghost").await.unwrap_err().is_not_found());
        assert!(registry.heartbeat("ghost").await.unwrap_err().is_not_found());
        assert!(registry.remove("ghost").await.unwrap_err().is_not_found());
        assert!(registry
            .update_endpoints("ghost", Map::new())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_get_endpoints_refreshes_last_seen() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "alice")).await.unwrap();
        let old = Utc::now() - chrono::Duration::seconds(90);
        registry.set_last_seen("p1", old).await.unwrap();

        registry.get_endpoints("p1").await.unwrap();
        assert!(registry.get("p1").await.unwrap().last_seen > old);
    }

    #[tokio::test]
    async fn test_update_adds_peer_and_keeps_bot() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "alice")).await.unwrap();

        let endpoints = registry
            .update_endpoints(
                "p1",
                as_map(json!({"carol": {"host": "10.0.0.4", "port": 10004}})),
            )
            .await
            .unwrap();

        assert_eq!(
            endpoints["carol"],
            EndpointDescriptor::Peer(PeerEndpoint::new("10.0.0.4", 10004))
        );
        assert_eq!(
            endpoints[BOT_TARGET],
            EndpointDescriptor::Api(default_bot_endpoint())
        );
    }

    #[tokio::test]
    async fn test_update_bot_temperature_preserves_other_fields() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "alice")).await.unwrap();

        let endpoints = registry
            .update_endpoints(
                "p1",
                as_map(json!({"BOT": {"model_config": {"temperature": 0.2}}})),
            )
            .await
            .unwrap();

        let EndpointDescriptor::Api(bot) = &endpoints[BOT_TARGET] else {
            panic!("BOT must stay an api endpoint");
        };
        let default = default_bot_endpoint();
        assert_eq!(bot.model_config["temperature"], json!(0.2));
        for key in ["model", "max_tokens", "top_p", "stream"] {
            assert_eq!(bot.model_config[key], default.model_config[key], "{key}");
        }
        assert_eq!(bot.host, default.host);
        assert_eq!(bot.path, default.path);
        assert_eq!(bot.headers, default.headers);
        assert_eq!(bot.transform_request, default.transform_request);
    }

    #[tokio::test]
    async fn test_update_demoting_bot_keeps_custom_path_for_dispatch() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "alice")).await.unwrap();

        let endpoints = registry
            .update_endpoints(
                "p1",
                as_map(json!({"BOT": {"is_api": false, "path": "/custom"}})),
            )
            .await
            .unwrap();

        let EndpointDescriptor::Api(bot) = &endpoints[BOT_TARGET] else {
            panic!("BOT must stay an api endpoint");
        };
        assert_eq!(bot.path, "/custom");
        assert!(bot.extra.is_empty());
        assert_eq!(bot.transform_request, default_bot_endpoint().transform_request);
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "alice")).await.unwrap();
        let update = as_map(json!({
            "bob": {"host": "127.0.0.1", "port": 10002},
            "BOT": {"model_config": {"max_tokens": 400}}
        }));

        let once = registry.update_endpoints("p1", update.clone()).await.unwrap();
        let twice = registry.update_endpoints("p1", update).await.unwrap();
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_invalid_update_leaves_table_unchanged() {
        let registry = ProxyRegistry::default();
        let before = registry.register(register_request("p1", "alice")).await.unwrap();

        let err = registry
            .update_endpoints("p1", as_map(json!({"dave": {"port": 10005}})))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));

        let err = registry
            .update_endpoints("p1", as_map(json!({"BOT": {"model_config": "hot"}})))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::Validation(_)));

        assert_eq!(registry.get("p1").await.unwrap().endpoints, before);
    }

    #[tokio::test]
    async fn test_evict_stale_uses_strict_threshold() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("old", "alice")).await.unwrap();
        registry.register(register_request("fresh", "bob")).await.unwrap();

        let now = Utc::now();
        registry
            .set_last_seen("old", now - chrono::Duration::seconds(121))
            .await
            .unwrap();
        registry
            .set_last_seen("fresh", now - chrono::Duration::seconds(119))
            .await
            .unwrap();

        let evicted = registry.evict_stale(Duration::from_secs(120)).await;
        assert_eq!(evicted, vec!["old".to_string()]);
        assert!(registry.get("old").await.is_err());
        assert!(registry.get("fresh").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_reports_liveness() {
        let registry = ProxyRegistry::default();
        registry.register(register_request("p1", "bob")).await.unwrap();
        registry.register(register_request("p2", "alice")).await.unwrap();
        registry
            .set_last_seen("p1", Utc::now() - chrono::Duration::seconds(90))
            .await
            .unwrap();

        let proxies = registry.list().await;
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].instance_name, "alice");
        assert_eq!(proxies[0].liveness, ProxyLiveness::Active);
        assert_eq!(proxies[1].liveness, ProxyLiveness::Warning);
        assert_eq!(proxies[1].targets, vec![BOT_TARGET.to_string()]);
    }
}
