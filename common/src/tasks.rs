//! バックグラウンドタスク管理
//!
//! 起動時に生成した定期タスク（スイープ、ハートビート、同期）をまとめて保持し、
//! シャットダウン時に中断して終了を待つ。

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 名前付きバックグラウンドタスクの集合
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// 空の集合を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 起動済みタスクを追加
    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.push((name, handle));
    }

    /// 保持しているタスク数
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// タスクを保持していないか
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// すべてのタスクを中断し、終了を待つ
    pub async fn shutdown(self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
        for (name, handle) in self.handles {
            match handle.await {
                Ok(()) => debug!(task = name, "Background task finished"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Background task cancelled"),
                Err(e) => warn!(task = name, error = %e, "Background task panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_aborts_long_running_tasks() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut tasks = BackgroundTasks::new();
        tasks.push(
            "sleeper",
            tokio::spawn({
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    finished.store(true, Ordering::SeqCst);
                }
            }),
        );
        assert_eq!(tasks.len(), 1);

        tokio::time::timeout(Duration::from_secs(2), tasks.shutdown())
            .await
            .expect("shutdown should not wait for the sleeper");
        assert!(!finished.load(Ordering::SeqCst));
    }
}
