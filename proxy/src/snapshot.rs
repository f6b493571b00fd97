//! エンドポイントテーブルのローカルスナップショット
//!
//! Coordinatorから取得したテーブルを丸ごと置き換える形で保持する。

use chatmesh_common::types::EndpointTable;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// 置き換え前後のターゲット名の差分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// 追加されたターゲット
    pub added: Vec<String>,
    /// 削除されたターゲット
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    /// 変化がないか
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// エンドポイントスナップショット
#[derive(Clone, Default)]
pub struct EndpointSnapshot {
    table: Arc<RwLock<EndpointTable>>,
}

impl EndpointSnapshot {
    /// 空のスナップショット
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期テーブルを指定して作成
    pub fn with_table(table: EndpointTable) -> Self {
        Self {
            table: Arc::new(RwLock::new(table)),
        }
    }

    /// 現在のテーブルのコピー
    pub async fn table(&self) -> EndpointTable {
        self.table.read().await.clone()
    }

    /// 現在のターゲット名
    pub async fn targets(&self) -> Vec<String> {
        self.table.read().await.keys().cloned().collect()
    }

    /// テーブルを丸ごと置き換え、差分を返す
    pub async fn replace(&self, next: EndpointTable) -> SnapshotDiff {
        let mut table = self.table.write().await;
        let before: BTreeSet<&String> = table.keys().collect();
        let after: BTreeSet<&String> = next.keys().collect();

        let diff = SnapshotDiff {
            added: after.difference(&before).map(|s| s.to_string()).collect(),
            removed: before.difference(&after).map(|s| s.to_string()).collect(),
        };
        drop(before);
        drop(after);
        *table = next;

        if !diff.added.is_empty() {
            info!(targets = ?diff.added, "Added peers");
        }
        if !diff.removed.is_empty() {
            info!(targets = ?diff.removed, "Removed peers");
        }
        diff
    }
}
