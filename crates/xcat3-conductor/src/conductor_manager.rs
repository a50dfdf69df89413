//! C7 Conductor manager (§4.6): the per-RPC-entry-point handler. Each
//! method here opens a task context with the lock mode the operation
//! needs, fans out over the reserved nodes bounded by the shared
//! node-worker pool, and returns one [`Outcome`] per node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use xcat3_common::error::Outcome;
use xcat3_common::states::{BootDevice, PowerTarget};
use xcat3_common::Result;
use xcat3_db::{Node, Store};
use xcat3_plugins::PluginRegistry;

use crate::concurrency::NodeWorkerPool;
use crate::pipeline::Pipeline;
use crate::task_manager::TaskManager;

pub struct ConductorManager {
    store: Arc<dyn Store>,
    registry: Arc<PluginRegistry>,
    task_manager: Arc<TaskManager>,
    worker_pool: Arc<NodeWorkerPool>,
    pipeline: Arc<Pipeline>,
}

impl ConductorManager {
    pub fn new(store: Arc<dyn Store>, registry: Arc<PluginRegistry>, task_manager: Arc<TaskManager>, worker_pool: Arc<NodeWorkerPool>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            store,
            registry,
            task_manager,
            worker_pool,
            pipeline,
        }
    }

    fn new_tag(purpose: &str) -> String {
        format!("{purpose}-{}", uuid::Uuid::new_v4())
    }

    /// §4.6: a shared reservation's `nodes` snapshot is a pure load, no
    /// lock is held across the fan-out — used by the read-only entry
    /// points (`get_power_state`, `get_boot_device`).
    async fn fanout_read<F, Fut>(&self, names: &[String], workers: u32, f: F) -> Result<HashMap<String, Outcome>>
    where
        F: Fn(Node) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Outcome>> + Send + 'static,
    {
        let tag = Self::new_tag("read");
        let task = self.task_manager.acquire(names, true, true, "read", &tag).await?;
        let nodes = task.nodes.clone();
        let concurrency = self.worker_pool.concurrency_for(workers, nodes.len());
        Ok(self.worker_pool.run(nodes, concurrency, |n: &Node| n.name.clone(), f).await)
    }

    /// The mutating entry points hold an exclusive reservation for the
    /// whole fan-out, and release it afterward regardless of outcome.
    async fn fanout_exclusive<F, Fut>(&self, names: &[String], workers: u32, purpose: &str, f: F) -> Result<HashMap<String, Outcome>>
    where
        F: Fn(Node) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Outcome>> + Send + 'static,
    {
        let tag = Self::new_tag(purpose);
        let task = self.task_manager.acquire(names, false, true, purpose, &tag).await?;
        let nodes = task.nodes.clone();
        let concurrency = self.worker_pool.concurrency_for(workers, nodes.len());
        let outcomes = self.worker_pool.run(nodes, concurrency, |n: &Node| n.name.clone(), f).await;
        task.release().await?;
        Ok(outcomes)
    }

    pub async fn change_power_state(&self, names: &[String], target: PowerTarget, workers: u32) -> Result<HashMap<String, Outcome>> {
        let registry = self.registry.clone();
        self.fanout_exclusive(names, workers, "power", move |node| {
            let registry = registry.clone();
            async move {
                let plugin = registry.get_control_plugin(&node)?;
                plugin.validate(&node)?;
                match target {
                    PowerTarget::Reboot => plugin.reboot(&node).await?,
                    other => plugin.set_power_state(&node, other).await?,
                }
                Ok(Outcome::success())
            }
        })
        .await
    }

    pub async fn get_power_state(&self, names: &[String], workers: u32) -> Result<HashMap<String, Outcome>> {
        let registry = self.registry.clone();
        self.fanout_read(names, workers, move |node| {
            let registry = registry.clone();
            async move {
                let plugin = registry.get_control_plugin(&node)?;
                let state = plugin.get_power_state(&node).await?;
                Ok(Outcome::detail(format!("{state:?}").to_lowercase()))
            }
        })
        .await
    }

    pub async fn get_boot_device(&self, names: &[String], workers: u32) -> Result<HashMap<String, Outcome>> {
        let registry = self.registry.clone();
        self.fanout_read(names, workers, move |node| {
            let registry = registry.clone();
            async move {
                let plugin = registry.get_control_plugin(&node)?;
                let device = plugin.get_boot_device(&node).await?;
                Ok(Outcome::detail(device.as_wire()))
            }
        })
        .await
    }

    pub async fn set_boot_device(&self, names: &[String], device: BootDevice, workers: u32) -> Result<HashMap<String, Outcome>> {
        let registry = self.registry.clone();
        self.fanout_exclusive(names, workers, "boot_device", move |node| {
            let registry = registry.clone();
            async move {
                let plugin = registry.get_control_plugin(&node)?;
                plugin.validate(&node)?;
                plugin.set_boot_device(&node, device).await?;
                Ok(Outcome::success())
            }
        })
        .await
    }

    /// Destroying nodes is a pure object-layer operation (§4.2): no
    /// plugin call is needed, `Store::destroy_nodes` already refuses
    /// any node in `DEPLOY_NODESET` (§9).
    pub async fn destroy_nodes(&self, names: &[String]) -> Result<HashMap<String, Outcome>> {
        let refused = self.store.destroy_nodes(names).await?;
        let refused: std::collections::HashSet<&String> = refused.iter().collect();
        Ok(names
            .iter()
            .map(|name| {
                if refused.contains(name) {
                    (name.clone(), Outcome::error("node cannot be destroyed while deploy_nodeset"))
                } else {
                    (name.clone(), Outcome::success())
                }
            })
            .collect())
    }

    /// §3: an OSImage is destroyed only if no Node still references it.
    pub async fn destroy_osimage(&self, name: &str) -> Result<()> {
        let image = self
            .store
            .find_osimage_by_name(name)
            .await?
            .ok_or_else(|| xcat3_common::Error::not_found(xcat3_common::error::NotFoundKind::OsImage(name.to_string())))?;
        let id = image.id.expect("persisted osimage carries an id");
        let referenced = self.store.count_nodes_with_osimage(id).await?;
        if referenced > 0 {
            return Err(xcat3_common::Error::conflict(xcat3_common::error::ConflictKind::InvalidState(format!(
                "OSImage {name} is still referenced by {referenced} node(s)"
            ))));
        }
        self.store.destroy_osimage(name).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn provision(
        &self,
        names: &[String],
        target: xcat3_common::states::ProvisionTarget,
        osimage: Option<&str>,
        passwd: Option<&str>,
        subnet: Option<&str>,
        workers: u32,
    ) -> Result<HashMap<String, Outcome>> {
        self.pipeline.provision(names, target, osimage, passwd, subnet, workers).await
    }

    pub async fn clean(&self, names: &[String]) -> Result<HashMap<String, Outcome>> {
        self.pipeline.clean(names).await
    }

    pub async fn provision_callback(&self, name: &str, action: Option<serde_json::Value>) -> Result<serde_json::Value> {
        self.pipeline.provision_callback(name, action).await
    }
}

/// §4.6 timeout the conductor-manager's own fan-out races against,
/// used by `rpc_handler.rs` when building the shared [`NodeWorkerPool`].
pub fn default_timeout(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs)
}
