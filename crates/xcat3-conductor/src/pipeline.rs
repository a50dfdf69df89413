//! C8 Provisioning pipeline (§4.7): the OS-deploy choreography, composed
//! on top of the three plugin kinds (§4.3) and the node-worker pool
//! (§4.6) shared with `conductor_manager.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use xcat3_common::crypt::crypt_password;
use xcat3_common::error::{ConflictKind, NotFoundKind, Outcome};
use xcat3_common::states::{BootDevice, ProvisionState, ProvisionTarget};
use xcat3_common::{Error, Result};
use xcat3_db::{DhcpBlob, Node, OsImage, Store};
use xcat3_plugins::boot::BootContext;
use xcat3_plugins::os::OsContext;
use xcat3_plugins::PluginRegistry;

use crate::concurrency::NodeWorkerPool;
use crate::network_client::NetworkClient;
use crate::task_manager::TaskManager;

/// The ISO mount/extract "copycd" step is an explicit non-goal: only
/// its interface with the core is specified here. `ensure_tree` fetches
/// the backed-up ISO to `iso_cache_path` and is responsible for making
/// `tree_path` exist afterward; a real deployment plugs in whatever
/// extraction tool it has, this crate ships only the interface plus a
/// fetch-and-mark-present default.
#[async_trait]
pub trait OsTreeProvisioner: Send + Sync {
    async fn ensure_tree(&self, iso_url: &str, iso_cache_path: &Path, tree_path: &Path) -> Result<()>;
}

/// Default provisioner: downloads the ISO in chunks (never one
/// `read_to_end`, per the file-copy yielding requirement) and creates
/// the tree directory. The actual extraction is the external copycd
/// tool's job, out of scope here.
#[derive(Default)]
pub struct FetchOnlyProvisioner {
    client: reqwest::Client,
}

impl FetchOnlyProvisioner {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl OsTreeProvisioner for FetchOnlyProvisioner {
    async fn ensure_tree(&self, iso_url: &str, iso_cache_path: &Path, tree_path: &Path) -> Result<()> {
        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = iso_cache_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Unclassified(format!("create iso cache dir: {e}")))?;
        }
        let resp = self
            .client
            .get(iso_url)
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("iso fetch {iso_url} failed: {e}")))?;
        let mut file = tokio::fs::File::create(iso_cache_path)
            .await
            .map_err(|e| Error::Unclassified(format!("create iso cache file: {e}")))?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Unclassified(format!("iso fetch {iso_url} interrupted: {e}")))?;
            file.write_all(&chunk).await.map_err(|e| Error::Unclassified(format!("write iso cache: {e}")))?;
        }
        tokio::fs::create_dir_all(tree_path).await.map_err(|e| Error::Unclassified(format!("create tree dir: {e}")))?;
        Ok(())
    }
}

pub struct Pipeline {
    store: Arc<dyn Store>,
    registry: Arc<PluginRegistry>,
    task_manager: Arc<TaskManager>,
    worker_pool: Arc<NodeWorkerPool>,
    network_client: Arc<NetworkClient>,
    os_tree_provisioner: Arc<dyn OsTreeProvisioner>,
    boot_ctx: BootContext,
    os_ctx: OsContext,
    install_dir: String,
    api_host: String,
    service_id: u64,
    ssh_pub_key_path: Option<String>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<PluginRegistry>,
        task_manager: Arc<TaskManager>,
        worker_pool: Arc<NodeWorkerPool>,
        network_client: Arc<NetworkClient>,
        os_tree_provisioner: Arc<dyn OsTreeProvisioner>,
        boot_ctx: BootContext,
        os_ctx: OsContext,
        install_dir: String,
        api_host: String,
        service_id: u64,
        ssh_pub_key_path: Option<String>,
    ) -> Self {
        Self {
            store,
            registry,
            task_manager,
            worker_pool,
            network_client,
            os_tree_provisioner,
            boot_ctx,
            os_ctx,
            install_dir,
            api_host,
            service_id,
            ssh_pub_key_path,
        }
    }

    /// §4.7 step 1: drop non-existent and already-locked names up front
    /// so the exclusive reservation below is only attempted over names
    /// that can plausibly succeed.
    async fn filter_unavailable(&self, names: &[String]) -> Result<(Vec<String>, HashMap<String, Outcome>)> {
        let existing = self.store.list_in(names, false).await?;
        let by_name: HashMap<&str, &Node> = existing.iter().map(|n| (n.name.as_str(), n)).collect();
        let mut live = Vec::with_capacity(names.len());
        let mut outcomes = HashMap::new();
        for name in names {
            match by_name.get(name.as_str()) {
                None => {
                    outcomes.insert(name.clone(), Outcome::NotFound);
                }
                Some(node) if node.reservation.is_some() => {
                    outcomes.insert(name.clone(), Outcome::Locked);
                }
                Some(_) => live.push(name.clone()),
            }
        }
        Ok((live, outcomes))
    }

    /// Inter-process file lock keyed on the osimage's orig_name (§5):
    /// downloads and stages the install tree if it doesn't already
    /// exist, serializing concurrent provisions of the same image
    /// across worker processes.
    async fn ensure_osimage(&self, image: &OsImage) -> Result<()> {
        let tree_path = image.tree_path(&self.install_dir);
        if tokio::fs::metadata(&tree_path).await.is_ok() {
            return Ok(());
        }

        let iso_dir = Path::new(&self.install_dir).join("iso");
        tokio::fs::create_dir_all(&iso_dir).await.map_err(|e| Error::Unclassified(format!("create iso dir: {e}")))?;
        let lock_path = iso_dir.join(format!("{}.lock", image.orig_name));

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let f = std::fs::OpenOptions::new().create(true).write(true).open(&lock_path)?;
            fs2::FileExt::lock_exclusive(&f)?;
            Ok(f)
        })
        .await
        .map_err(|e| Error::Unclassified(format!("iso lock task panicked: {e}")))?
        .map_err(|e| Error::Unclassified(format!("acquire iso lock for {}: {e}", image.orig_name)))?;

        let result = if tokio::fs::metadata(&tree_path).await.is_err() {
            let iso_cache_path: PathBuf = iso_dir.join(&image.orig_name);
            let iso_url = format!("http://{}/install/iso/{}", self.api_host, image.orig_name);
            self.os_tree_provisioner.ensure_tree(&iso_url, &iso_cache_path, &tree_path).await
        } else {
            Ok(())
        };

        let _ = tokio::task::spawn_blocking(move || fs2::FileExt::unlock(&file)).await;
        result
    }

    async fn resolve_osimage(&self, node: &Node, osimage_arg: Option<&OsImage>) -> Result<Option<OsImage>> {
        if let Some(img) = osimage_arg {
            return Ok(Some(img.clone()));
        }
        match node.osimage_id {
            Some(id) => self.store.get_osimage(id).await,
            None => Ok(None),
        }
    }

    async fn resolve_passwd(&self, passwd_arg: Option<&str>) -> Result<Option<String>> {
        let Some(key) = passwd_arg else { return Ok(None) };
        match self.store.get_passwd(key).await? {
            Some(p) => Ok(Some(crypt_password(&p.password, p.crypt_method))),
            None => Err(Error::not_found(NotFoundKind::Passwd(key.to_string()))),
        }
    }

    /// `provision(names, target, osimage_arg, passwd_arg, subnet_arg)`
    /// (§4.7). `un_dhcp`/`un_nodeset` route to [`Pipeline::clean`] — the
    /// undo targets are named but not given their own teardown
    /// semantics, so both fold onto the one documented teardown path
    /// (recorded in DESIGN.md). `workers` is the same incoming-RPC
    /// sub-shard hint every other entry point takes (§4.5/§4.6):
    /// `provision` is named alongside `change_power_state` and
    /// `set_boot_device` in §4.6's list of RPC entry points bound by
    /// the worker-pool fan-out, not singled out.
    #[allow(clippy::too_many_arguments)]
    pub async fn provision(
        &self,
        names: &[String],
        target: ProvisionTarget,
        osimage_arg: Option<&str>,
        passwd_arg: Option<&str>,
        subnet_arg: Option<&str>,
        workers: u32,
    ) -> Result<HashMap<String, Outcome>> {
        if target.is_undo() {
            return self.clean(names).await;
        }

        let (live_names, mut outcomes) = self.filter_unavailable(names).await?;
        if live_names.is_empty() {
            return Ok(outcomes);
        }

        let tag = format!("provision-{}", uuid::Uuid::new_v4());
        let task = self.task_manager.acquire(&live_names, false, true, "provision", &tag).await?;
        let nodes = task.nodes.clone();

        let osimage_arg_resolved = match osimage_arg {
            Some(name) => Some(
                self.store
                    .find_osimage_by_name(name)
                    .await?
                    .ok_or_else(|| Error::not_found(NotFoundKind::OsImage(name.to_string())))?,
            ),
            None => None,
        };
        let crypted_password = self.resolve_passwd(passwd_arg).await?;

        let mut in_play_images: HashMap<u64, OsImage> = HashMap::new();
        let mut per_node_image: HashMap<String, OsImage> = HashMap::new();
        let mut runnable_nodes = Vec::with_capacity(nodes.len());
        for node in nodes {
            if target == ProvisionTarget::Dhcp {
                runnable_nodes.push(node);
                continue;
            }
            match self.resolve_osimage(&node, osimage_arg_resolved.as_ref()).await? {
                Some(img) => {
                    if let Some(id) = img.id {
                        in_play_images.insert(id, img.clone());
                    }
                    per_node_image.insert(node.name.clone(), img);
                    runnable_nodes.push(node);
                }
                None => {
                    outcomes.insert(node.name.clone(), Outcome::error("OSImage is not defined for this node"));
                }
            }
        }

        for image in in_play_images.values() {
            self.ensure_osimage(image).await?;
        }

        let concurrency = self.worker_pool.concurrency_for(workers, runnable_nodes.len());
        let collected: Arc<AsyncMutex<HashMap<String, (Node, DhcpBlob)>>> = Arc::new(AsyncMutex::new(HashMap::new()));

        let boot_ctx = self.boot_ctx.clone();
        let os_ctx = self.os_ctx.clone();
        let registry = self.registry.clone();
        let service_id = self.service_id;

        let run_outcomes = self
            .worker_pool
            .run(
                runnable_nodes
                    .into_iter()
                    .map(|node| {
                        let image = per_node_image.get(&node.name).cloned();
                        (node, image)
                    })
                    .collect(),
                concurrency,
                |(node, _): &(Node, Option<OsImage>)| node.name.clone(),
                {
                    let boot_ctx = boot_ctx.clone();
                    let os_ctx = os_ctx.clone();
                    let registry = registry.clone();
                    let password = crypted_password.clone();
                    let collected = collected.clone();
                    move |(mut node, image): (Node, Option<OsImage>)| {
                        let boot_ctx = boot_ctx.clone();
                        let os_ctx = os_ctx.clone();
                        let registry = registry.clone();
                        let password = password.clone();
                        let collected = collected.clone();
                        async move {
                            let boot_plugin = registry.get_boot_plugin(&node)?;
                            boot_plugin.validate(&node)?;

                            if target != ProvisionTarget::Dhcp {
                                let image = image.ok_or_else(|| Error::Unclassified("OSImage is not defined for this node".to_string()))?;
                                let os_plugin = registry.get_osimage_plugin(&image)?;
                                os_plugin.validate(&node, &image)?;
                                let os_boot_str = os_plugin.build_os_boot_str(&node, &image, &os_ctx)?;
                                os_plugin.render(&node, &image, password.as_deref(), &os_ctx).await?;
                                boot_plugin.build_boot_conf(&node, &os_boot_str, &image, &boot_ctx).await?;
                                node.set_state(ProvisionState::DeployNodeset);
                                node.set_osimage_id(image.id);
                            } else {
                                node.set_state(ProvisionState::DeployDhcp);
                            }
                            node.set_conductor_affinity(Some(service_id));

                            let opts = boot_plugin.gen_dhcp_opts(&node, &boot_ctx)?;
                            let (statements, content) = opts.render();
                            let mut blob = DhcpBlob::new(node.name.clone());
                            blob.mac = Some(opts.mac.clone());
                            blob.ip = opts.ip.clone();
                            blob.hostname = opts.hostname.clone();
                            blob.statements = statements;
                            blob.content = content;

                            let mut guard = collected.lock().await;
                            guard.insert(node.name.clone(), (node, blob));
                            Ok(Outcome::success())
                        }
                    }
                },
            )
            .await;
        outcomes.extend(run_outcomes);

        let collected = Arc::try_unwrap(collected).map(|m| m.into_inner()).unwrap_or_default();
        let mut touched_nodes = Vec::with_capacity(collected.len());
        let mut dhcp_blobs = Vec::with_capacity(collected.len());
        for (_name, (node, blob)) in collected {
            touched_nodes.push(node);
            dhcp_blobs.push(blob);
        }

        if !dhcp_blobs.is_empty() {
            self.store.save_or_update_dhcp(dhcp_blobs).await?;
        }
        if !touched_nodes.is_empty() {
            self.store.save_nodes(&touched_nodes).await?;
        }

        if !touched_nodes.is_empty() {
            if let Err(e) = self.network_client.enable_dhcp_option(subnet_arg).await {
                for node in &touched_nodes {
                    outcomes.insert(node.name.clone(), Outcome::error(format!("DHCP prepared but not active: {e}")));
                }
            }
        }

        task.release().await?;
        Ok(outcomes)
    }

    /// `clean(names)` (§4.7): tear down per-node artifacts and DHCP
    /// state, reset provisioning identity.
    pub async fn clean(&self, names: &[String]) -> Result<HashMap<String, Outcome>> {
        let tag = format!("clean-{}", uuid::Uuid::new_v4());
        let task = self.task_manager.acquire(names, false, true, "clean", &tag).await?;
        let nodes = task.nodes.clone();
        let concurrency = self.worker_pool.concurrency_for(nodes.len() as u32, nodes.len());

        let boot_ctx = self.boot_ctx.clone();
        let os_ctx = self.os_ctx.clone();
        let registry = self.registry.clone();
        let store = self.store.clone();
        let collected: Arc<AsyncMutex<Vec<Node>>> = Arc::new(AsyncMutex::new(Vec::new()));

        let outcomes = self
            .worker_pool
            .run(
                nodes,
                concurrency,
                |node: &Node| node.name.clone(),
                {
                    let collected = collected.clone();
                    move |mut node: Node| {
                        let boot_ctx = boot_ctx.clone();
                        let os_ctx = os_ctx.clone();
                        let registry = registry.clone();
                        let store = store.clone();
                        let collected = collected.clone();
                        async move {
                            let boot_plugin = registry.get_boot_plugin(&node)?;
                            boot_plugin.clean(&node, &boot_ctx).await?;

                            if let Some(osimage_id) = node.osimage_id {
                                if let Some(image) = store.get_osimage(osimage_id).await? {
                                    let os_plugin = registry.get_osimage_plugin(&image)?;
                                    os_plugin.clean(&node, &os_ctx).await?;
                                }
                            }

                            node.set_state(ProvisionState::Undeployed);
                            node.set_conductor_affinity(None);

                            let mut guard = collected.lock().await;
                            guard.push(node);
                            Ok(Outcome::success())
                        }
                    }
                },
            )
            .await;

        let touched = Arc::try_unwrap(collected).map(|m| m.into_inner()).unwrap_or_default();
        if !touched.is_empty() {
            self.store.save_nodes(&touched).await?;
        }
        self.store.destroy_dhcp(names).await?;
        task.release().await?;
        Ok(outcomes)
    }

    /// `provision_callback(name, action)` (§4.7). A
    /// `{fetch_ssh_pub: user}` action short-circuits state advancement
    /// and returns the controller's SSH public key instead.
    pub async fn provision_callback(&self, name: &str, action: Option<serde_json::Value>) -> Result<serde_json::Value> {
        if let Some(action) = &action {
            if action.get("fetch_ssh_pub").is_some() {
                let path = self
                    .ssh_pub_key_path
                    .as_deref()
                    .ok_or_else(|| Error::not_found(NotFoundKind::File("ssh public key not configured".to_string())))?;
                let pub_key = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|_| Error::not_found(NotFoundKind::File(path.to_string())))?;
                return Ok(serde_json::json!({ "pub_key": pub_key.trim() }));
            }
        }

        let names = vec![name.to_string()];
        let tag = format!("callback-{}", uuid::Uuid::new_v4());
        let task = self.task_manager.acquire(&names, false, true, "provision_callback", &tag).await?;
        let mut node = match task.nodes.first().cloned() {
            Some(n) => n,
            None => {
                task.release().await?;
                return Err(Error::not_found(NotFoundKind::Node(name.to_string())));
            }
        };

        if node.conductor_affinity.is_none() {
            task.release().await?;
            return Err(Error::conflict(ConflictKind::DeployStateFailure(format!(
                "node {name} has no conductor_affinity at callback time"
            ))));
        }

        let boot_plugin = self.registry.get_boot_plugin(&node)?;
        if let Err(e) = boot_plugin.continue_deploy(&node, &self.boot_ctx).await {
            task.release().await?;
            return Err(e);
        }

        let control_plugin = self.registry.get_control_plugin(&node)?;
        if let Err(e) = control_plugin.set_boot_device(&node, BootDevice::Disk).await {
            log::warn!("pipeline: set_boot_device(disk) failed for node {name} at callback time: {e}");
        }

        if let Some(osimage_id) = node.osimage_id {
            if let Some(image) = self.store.get_osimage(osimage_id).await? {
                if let Ok(os_plugin) = self.registry.get_osimage_plugin(&image) {
                    if let Err(e) = os_plugin.clean(&node, &self.os_ctx).await {
                        log::warn!("pipeline: os_plugin clean failed for node {name} at callback time: {e}");
                    }
                }
            }
        }

        node.set_state(ProvisionState::DeployDone);
        node.set_conductor_affinity(None);
        self.store.save_nodes(std::slice::from_ref(&node)).await?;
        task.release().await?;
        Ok(serde_json::json!({ "name": name, "state": node.state.as_wire() }))
    }
}
