//! C5 Task manager (§4.4): cluster-wide reservation discipline.
//! `TaskGuard` is an RAII handle: its `Drop` releases the reservation on
//! every exit path, the same "spawn, then always run the bookkeeping
//! tail" shape used by the async spawn-and-reconcile loop below.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xcat3_common::error::ConflictKind;
use xcat3_common::{Error, Result};
use xcat3_db::{Node, Store};

pub struct TaskManager {
    store: Arc<dyn Store>,
    node_locked_retry_attempts: u32,
    node_locked_retry_interval: Duration,
}

impl TaskManager {
    pub fn new(store: Arc<dyn Store>, node_locked_retry_attempts: u32, node_locked_retry_interval: Duration) -> Self {
        Self {
            store,
            node_locked_retry_attempts: node_locked_retry_attempts.max(1),
            node_locked_retry_interval,
        }
    }

    /// `acquire(names, shared, want_nics, purpose)` (§4.4). Shared
    /// acquisition performs no DB mutation, only a load; exclusive
    /// acquisition retries the conditional reservation update up to
    /// `node_locked_retry_attempts` times.
    pub async fn acquire(
        &self,
        names: &[String],
        shared: bool,
        want_nics: bool,
        purpose: &str,
        tag: &str,
    ) -> Result<TaskGuard> {
        log::debug!("task_manager: acquiring {names:?} shared={shared} purpose={purpose}");
        if shared {
            let nodes = self.store.list_in(names, want_nics).await?;
            return Ok(TaskGuard::new_shared(nodes));
        }

        let mut last_err = None;
        for attempt in 1..=self.node_locked_retry_attempts {
            match self.store.reserve_many(tag, names).await {
                Ok(()) => {
                    let nodes = self.store.list_in(names, want_nics).await?;
                    return Ok(TaskGuard::new_exclusive(self.store.clone(), tag.to_string(), names.to_vec(), nodes));
                }
                Err(e @ Error::Conflict(ConflictKind::NodeLocked(_))) => {
                    last_err = Some(e);
                    if attempt < self.node_locked_retry_attempts {
                        tokio::time::sleep(self.node_locked_retry_interval).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::conflict(ConflictKind::NodeLocked(names.join(",")))))
    }
}

/// RAII reservation handle (§4.4, §9 "TaskGuard"). Release happens
/// exactly once, either explicitly via [`TaskGuard::release`] /
/// [`TaskGuard::release_after`] or, as a backstop, on `Drop`.
pub struct TaskGuard {
    store: Option<Arc<dyn Store>>,
    tag: String,
    names: Vec<String>,
    pub nodes: Vec<Node>,
    released: Arc<AtomicBool>,
}

impl TaskGuard {
    fn new_shared(nodes: Vec<Node>) -> Self {
        Self {
            store: None,
            tag: String::new(),
            names: Vec::new(),
            nodes,
            released: Arc::new(AtomicBool::new(true)),
        }
    }

    fn new_exclusive(store: Arc<dyn Store>, tag: String, names: Vec<String>, nodes: Vec<Node>) -> Self {
        Self {
            store: Some(store),
            tag,
            names,
            nodes,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// Explicit, deterministic release on the normal exit path.
    pub async fn release(mut self) -> Result<()> {
        self.release_inner().await
    }

    async fn release_inner(&mut self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(store) = &self.store {
            store.release_many(&self.tag, &self.names).await?;
        }
        Ok(())
    }

    /// §4.4 release policy for `spawn_after`-style async completion: run
    /// `fut`, write the captured error (if any) to each node's
    /// `last_error`, then always release, regardless of which branch the
    /// spawned task took.
    pub async fn release_after<F, T>(mut self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let outcome = fut.await;
        if let (Err(e), Some(store)) = (&outcome, &self.store) {
            let mut failed_nodes = self.nodes.clone();
            for node in &mut failed_nodes {
                node.set_last_error(Some(e.to_string()));
            }
            let _ = store.save_nodes(&failed_nodes).await;
        }
        self.release_inner().await?;
        outcome
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(store) = self.store.clone() {
            let tag = self.tag.clone();
            let names = self.names.clone();
            tokio::spawn(async move {
                if let Err(e) = store.release_many(&tag, &names).await {
                    log::error!("task_manager: release_many({tag}) failed on drop path: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcat3_db::FakeStore;

    #[tokio::test]
    async fn exclusive_acquire_blocks_second_caller_until_release() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();
        let tm = TaskManager::new(store.clone(), 2, Duration::from_millis(5));

        let guard_a = tm.acquire(&["n1".to_string()], false, false, "test", "tag_a").await.unwrap();
        let err = tm.acquire(&["n1".to_string()], false, false, "test", "tag_b").await.unwrap_err();
        assert_eq!(err, Error::conflict(ConflictKind::NodeLocked("n1".to_string())));

        guard_a.release().await.unwrap();
        let guard_b = tm.acquire(&["n1".to_string()], false, false, "test", "tag_b").await.unwrap();
        assert_eq!(guard_b.nodes.len(), 1);
    }

    #[tokio::test]
    async fn shared_acquire_does_not_mutate_reservation() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();
        let tm = TaskManager::new(store.clone(), 2, Duration::from_millis(5));
        let _exclusive = tm.acquire(&["n1".to_string()], false, false, "test", "tag_a").await.unwrap();
        let shared = tm.acquire(&["n1".to_string()], true, false, "test", "tag_b").await.unwrap();
        assert_eq!(shared.nodes.len(), 1);
    }

    #[tokio::test]
    async fn drop_without_explicit_release_still_frees_the_node() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();
        let tm = TaskManager::new(store.clone(), 2, Duration::from_millis(5));
        {
            let _guard = tm.acquire(&["n1".to_string()], false, false, "test", "tag_a").await.unwrap();
        }
        tokio::task::yield_now().await;
        // give the drop-spawned release task a chance to run
        tokio::time::sleep(Duration::from_millis(20)).await;
        let guard_b = tm.acquire(&["n1".to_string()], false, false, "test", "tag_b").await.unwrap();
        assert_eq!(guard_b.nodes.len(), 1);
    }
}
