//! The two-level concurrency primitive shared by the conductor manager
//! (C7, §4.6) and the provisioning pipeline (C8, §4.7 step 4): a bounded
//! worker pool plus the `workers`-hint subdivision rule, so both callers
//! get the same "tag a future with its node, spawn it, wait up to a
//! deadline" shape `state_switcher.rs::start` uses, generalized from one
//! infinite loop into a single bounded fan-out over a fixed node list.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use xcat3_common::error::Outcome;
use xcat3_common::{Error, Result};

pub struct NodeWorkerPool {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    per_group_count: usize,
}

impl NodeWorkerPool {
    pub fn new(pool_size: usize, timeout: Duration, per_group_count: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            timeout,
            per_group_count: per_group_count.max(1),
        }
    }

    /// §4.5 worker-side subdivision rule: `workers` is only honored as
    /// concurrency width once the shard is big enough to be worth
    /// subdividing.
    pub fn concurrency_for(&self, workers_hint: u32, shard_len: usize) -> usize {
        if workers_hint > 1 && shard_len >= self.per_group_count {
            workers_hint as usize
        } else {
            1
        }
    }

    /// Runs `f` once per item of `items`, bounded globally by
    /// `conductor.workers_pool_size` (a full pool maps to
    /// `Error::NoFreeServiceWorker`) and with at most `concurrency` items
    /// in flight concurrently for this call. Every item produces exactly
    /// one `(key, Outcome)` pair — timeouts and panics included — so the
    /// result's key set always equals the input's (§8 invariant 7).
    pub async fn run<T, K, F, Fut>(&self, items: Vec<T>, concurrency: usize, key_of: impl Fn(&T) -> K + Send + Sync, f: F) -> HashMap<K, Outcome>
    where
        T: Send + 'static,
        K: std::hash::Hash + Eq + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        let timeout = self.timeout;
        let semaphore = self.semaphore.clone();
        let results = stream::iter(items.into_iter().map(|item| {
            let key = key_of(&item);
            let f = f.clone();
            let semaphore = semaphore.clone();
            async move {
                let permit = match semaphore.try_acquire_owned() {
                    Ok(p) => p,
                    Err(_) => return (key, Outcome::from(Error::NoFreeServiceWorker)),
                };
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    f(item).await
                });
                match tokio::time::timeout(timeout, handle).await {
                    Ok(Ok(Ok(outcome))) => (key, outcome),
                    Ok(Ok(Err(e))) => (key, Outcome::from(e)),
                    Ok(Err(join_err)) => (key, Outcome::error(join_err.to_string())),
                    Err(_elapsed) => (key, Outcome::timeout_after(timeout.as_secs())),
                }
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn run_returns_one_outcome_per_item() {
        let pool = NodeWorkerPool::new(4, Duration::from_secs(1), 2);
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = pool
            .run(items, 2, |s| s.clone(), |s: String| async move { Ok(Outcome::detail(s)) })
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results["a"], Outcome::detail("a"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_item_times_out_without_blocking_others() {
        let pool = NodeWorkerPool::new(4, Duration::from_millis(20), 2);
        let items = vec![0u32, 1u32];
        let results = pool
            .run(items, 2, |n| *n, |n: u32| async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok(Outcome::success())
            })
            .await;
        assert_eq!(results[&0], Outcome::Timeout(0));
        assert_eq!(results[&1], Outcome::success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_pool_reports_no_free_service_worker() {
        let pool = NodeWorkerPool::new(1, Duration::from_millis(200), 99);
        let items = vec![0u32, 1u32];
        let results = pool
            .run(items, 2, |n| *n, |n: u32| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Outcome::detail(n.to_string()))
            })
            .await;
        let locked_or_ok: Vec<_> = results.values().collect();
        assert!(locked_or_ok.iter().any(|o| matches!(o, Outcome::Error { .. })));
    }
}
