//! C6 Bulk dispatcher (§4.5): the API-side sharding + join. Lives in this
//! crate (rather than `xcat3-api`) because it shares the node-worker
//! join semantics with the conductor-side pool in `concurrency.rs`, and
//! because `xcat3-api` is a thin HTTP-shape layer over it — grounded the
//! same way `rpcapi.py`'s `ConductorAPI` sits next to `manager.py`'s
//! `ConductorManager` in one package in the original source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;
use xcat3_common::error::{NotFoundKind, Outcome};
use xcat3_common::{Error, Result};
use xcat3_db::{Node, Service, Store};
use xcat3_rpc::{topic_for, RpcEnvelope, Transport};

pub struct BulkDispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    heartbeat_timeout_secs: i64,
    workers_pool_size: usize,
}

impl BulkDispatcher {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>, heartbeat_timeout_secs: i64, workers_pool_size: usize) -> Self {
        Self {
            store,
            transport,
            heartbeat_timeout_secs,
            workers_pool_size,
        }
    }

    async fn live_conductors(&self) -> Result<Vec<Service>> {
        let services = self
            .store
            .live_services(xcat3_common::states::ServiceKind::Conductor, self.heartbeat_timeout_secs)
            .await?;
        if services.is_empty() {
            return Err(Error::not_found(NotFoundKind::NoValidHost));
        }
        Ok(services)
    }

    /// §4.5 step 3: contiguous split weighted by `max(workers, 1)`, with
    /// the remainder folded into the last shard. Shards with 0 names are
    /// dropped, satisfying §8 invariant 6 (sizes sum to `len(names)`, no
    /// name repeated or dropped).
    fn shard(names: &[String], services: &[Service]) -> Vec<(Service, Vec<String>)> {
        let total: u64 = services.iter().map(|s| s.weight() as u64).sum();
        let n = names.len();
        let mut shards = Vec::with_capacity(services.len());
        let mut consumed = 0usize;
        for (i, svc) in services.iter().enumerate() {
            let is_last = i == services.len() - 1;
            let count = if is_last {
                n - consumed
            } else {
                ((svc.weight() as u64 * n as u64) / total.max(1)) as usize
            };
            let end = (consumed + count).min(n);
            let slice = names[consumed..end].to_vec();
            consumed = end;
            if !slice.is_empty() {
                shards.push((svc.clone(), slice));
            }
        }
        shards
    }

    /// §4.5 steps 4-5 + §4.5's join contract. `method` is sent verbatim
    /// as the RPC method name; `extra_kwargs` is merged into every
    /// shard's envelope alongside `names`/`workers`.
    pub async fn dispatch(&self, names: &[String], method: &str, extra_kwargs: Map<String, Value>, timeout: Duration) -> Result<HashMap<String, Outcome>> {
        let services = self.live_conductors().await?;
        let shards = Self::shard(names, &services);
        let sem = Arc::new(Semaphore::new(self.workers_pool_size.max(1)));

        let mut tasks = Vec::with_capacity(shards.len());
        for (svc, shard_names) in shards {
            tasks.push(self.spawn_shard(svc, shard_names, method, extra_kwargs.clone(), sem.clone()));
        }
        Ok(join(tasks, timeout).await)
    }

    /// §4.5 affinity variant: route by `conductor_affinity` instead of
    /// re-sharding by live weight. Nodes whose affinity points at a
    /// conductor that can't be found are reported as error rows, never
    /// dispatched (§9 "Conductor … could not be found").
    pub async fn dispatch_by_affinity(&self, nodes: &[Node], method: &str, extra_kwargs: Map<String, Value>, timeout: Duration) -> Result<HashMap<String, Outcome>> {
        let mut groups: HashMap<u64, Vec<String>> = HashMap::new();
        let mut out = HashMap::new();
        for node in nodes {
            match node.conductor_affinity {
                Some(id) => groups.entry(id).or_default().push(node.name.clone()),
                None => {
                    out.insert(node.name.clone(), Outcome::error(format!("Conductor for node {} could not be found", node.name)));
                }
            }
        }

        let sem = Arc::new(Semaphore::new(self.workers_pool_size.max(1)));
        let mut tasks = Vec::with_capacity(groups.len());
        for (svc_id, group_names) in groups {
            match self.store.find_service_by_id(svc_id).await? {
                Some(svc) => tasks.push(self.spawn_shard(svc, group_names, method, extra_kwargs.clone(), sem.clone())),
                None => {
                    for name in group_names {
                        out.insert(name, Outcome::error(format!("Conductor {svc_id} could not be found")));
                    }
                }
            }
        }
        out.extend(join(tasks, timeout).await);
        Ok(out)
    }

    fn spawn_shard(
        &self,
        svc: Service,
        shard_names: Vec<String>,
        method: &str,
        mut kwargs: Map<String, Value>,
        sem: Arc<Semaphore>,
    ) -> (Vec<String>, tokio::task::JoinHandle<Result<HashMap<String, Outcome>>>) {
        let transport = self.transport.clone();
        let topic = topic_for(xcat3_common::states::ServiceKind::Conductor, &svc.hostname);
        let hostname = svc.hostname.clone();
        let weight = svc.weight();
        let method = method.to_string();
        kwargs.insert("names".to_string(), json!(shard_names));
        kwargs.insert("workers".to_string(), json!(weight));
        let envelope = RpcEnvelope::new(method, Value::Object(kwargs));

        let handle = tokio::spawn(async move {
            let _permit = sem.try_acquire_owned().map_err(|_| Error::NoFreeApiWorker)?;
            let result = transport.call(&hostname, &topic, envelope).await?;
            let map: HashMap<String, String> = serde_json::from_value(result).map_err(|e| Error::Unclassified(format!("undecodable shard reply: {e}")))?;
            Ok(map.into_iter().map(|(name, detail)| (name, Outcome::detail(detail))).collect())
        });
        (shard_names, handle)
    }
}

/// §4.5's `wait(futures, timeout)` contract, implemented per-shard so one
/// slow conductor's timeout can't swallow another shard's completed
/// result — each shard future races the same deadline independently and
/// they're all polled concurrently by `join_all`.
async fn join(tasks: Vec<(Vec<String>, tokio::task::JoinHandle<Result<HashMap<String, Outcome>>>)>, timeout: Duration) -> HashMap<String, Outcome> {
    let waits = tasks.into_iter().map(|(names, handle)| async move {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(map))) => (names, Ok(map)),
            Ok(Ok(Err(e))) => (names, Err(Outcome::from(e))),
            Ok(Err(join_err)) => (names, Err(Outcome::error(join_err.to_string()))),
            Err(_elapsed) => (names, Err(Outcome::timeout_after(timeout.as_secs()))),
        }
    });
    let per_shard = futures::future::join_all(waits).await;

    let mut out = HashMap::new();
    for (names, outcome) in per_shard {
        match outcome {
            Ok(map) => {
                for name in names {
                    let outcome = map.get(&name).cloned().unwrap_or_else(|| Outcome::error("missing from shard result"));
                    out.insert(name, outcome);
                }
            }
            Err(outcome) => {
                for name in names {
                    out.insert(name, outcome.clone());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcat3_common::states::ServiceKind;

    fn svc(hostname: &str, workers: u32) -> Service {
        Service::new(hostname, ServiceKind::Conductor, workers)
    }

    #[test]
    fn shard_sizes_sum_to_input_len_and_cover_every_name() {
        let names: Vec<String> = (0..8).map(|i| format!("n{i}")).collect();
        let services = vec![svc("a", 2), svc("b", 2)];
        let shards = BulkDispatcher::shard(&names, &services);
        let total: usize = shards.iter().map(|(_, s)| s.len()).sum();
        assert_eq!(total, names.len());
        let mut seen: Vec<String> = shards.iter().flat_map(|(_, s)| s.clone()).collect();
        seen.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn zero_size_shards_are_dropped() {
        let names: Vec<String> = vec!["n0".to_string()];
        let services = vec![svc("a", 1), svc("b", 1)];
        let shards = BulkDispatcher::shard(&names, &services);
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].1, vec!["n0".to_string()]);
    }

    #[test]
    fn remainder_goes_to_last_service() {
        let names: Vec<String> = (0..5).map(|i| format!("n{i}")).collect();
        let services = vec![svc("a", 1), svc("b", 1)];
        let shards = BulkDispatcher::shard(&names, &services);
        assert_eq!(shards[0].1.len(), 2);
        assert_eq!(shards[1].1.len(), 3);
    }
}
