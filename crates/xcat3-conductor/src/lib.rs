//! C4 Service registry, C5 task manager, C6 bulk dispatcher, C7
//! conductor manager, C8 provisioning pipeline (§4.4-§4.7), plus the
//! two-level concurrency primitive (§4.6/§5) they share.

pub mod conductor_manager;
pub mod concurrency;
pub mod dispatcher;
pub mod network_client;
pub mod pipeline;
pub mod task_manager;

pub use conductor_manager::ConductorManager;
pub use concurrency::NodeWorkerPool;
pub use dispatcher::BulkDispatcher;
pub use network_client::NetworkClient;
pub use pipeline::{FetchOnlyProvisioner, OsTreeProvisioner, Pipeline};
pub use task_manager::{TaskGuard, TaskManager};
/// Re-exported so existing call sites (`xcat3-conductor`'s own binary)
/// don't need to reach into `xcat3-db` directly; the type itself now
/// lives there so `xcat3-network`'s binary can share it too (§4.4, §6a).
pub use xcat3_db::ServiceRegistration;

/// The `xcat3.conductor_manager.<hostname>` RPC surface (§4.6 entry
/// points), exposed as one [`xcat3_rpc::RpcHandler`] so both
/// `InProcessTransport` (tests) and the HTTP server (production) can
/// dispatch into the same [`ConductorManager`].
pub struct ConductorRpcHandler {
    pub manager: std::sync::Arc<ConductorManager>,
}

#[async_trait::async_trait]
impl xcat3_rpc::RpcHandler for ConductorRpcHandler {
    async fn handle(&self, method: &str, kwargs: serde_json::Value) -> xcat3_common::Result<serde_json::Value> {
        use xcat3_common::error::Outcome;
        use xcat3_common::states::{BootDevice, PowerTarget, ProvisionTarget};
        use xcat3_common::{Error, Result};

        fn names_of(kwargs: &serde_json::Value) -> Result<Vec<String>> {
            kwargs
                .get("names")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .ok_or_else(|| Error::MissingParameterValue("names".to_string()))
        }

        fn workers_of(kwargs: &serde_json::Value) -> u32 {
            kwargs.get("workers").and_then(|v| v.as_u64()).unwrap_or(1) as u32
        }

        fn outcomes_to_json(outcomes: std::collections::HashMap<String, Outcome>) -> serde_json::Value {
            let map: std::collections::HashMap<String, String> = outcomes.into_iter().map(|(k, v)| (k, v.as_wire_string())).collect();
            serde_json::to_value(map).unwrap_or(serde_json::Value::Null)
        }

        match method {
            "change_power_state" => {
                let names = names_of(&kwargs)?;
                let workers = workers_of(&kwargs);
                let target = kwargs
                    .get("target")
                    .and_then(|v| v.as_str())
                    .and_then(PowerTarget::parse)
                    .ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
                let out = self.manager.change_power_state(&names, target, workers).await?;
                Ok(outcomes_to_json(out))
            }
            "get_power_state" => {
                let names = names_of(&kwargs)?;
                let workers = workers_of(&kwargs);
                let out = self.manager.get_power_state(&names, workers).await?;
                Ok(outcomes_to_json(out))
            }
            "get_boot_device" => {
                let names = names_of(&kwargs)?;
                let workers = workers_of(&kwargs);
                let out = self.manager.get_boot_device(&names, workers).await?;
                Ok(outcomes_to_json(out))
            }
            "set_boot_device" => {
                let names = names_of(&kwargs)?;
                let workers = workers_of(&kwargs);
                let device = kwargs
                    .get("target")
                    .and_then(|v| v.as_str())
                    .and_then(BootDevice::parse)
                    .ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
                let out = self.manager.set_boot_device(&names, device, workers).await?;
                Ok(outcomes_to_json(out))
            }
            "destroy_nodes" => {
                let names = names_of(&kwargs)?;
                let out = self.manager.destroy_nodes(&names).await?;
                Ok(outcomes_to_json(out))
            }
            "destroy_osimage" => {
                let name = kwargs
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::MissingParameterValue("name".to_string()))?;
                self.manager.destroy_osimage(name).await?;
                Ok(serde_json::json!({}))
            }
            "provision" => {
                let names = names_of(&kwargs)?;
                let workers = workers_of(&kwargs);
                let target = kwargs
                    .get("target")
                    .and_then(|v| v.as_str())
                    .and_then(ProvisionTarget::parse)
                    .ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
                let osimage = kwargs.get("osimage").and_then(|v| v.as_str());
                let passwd = kwargs.get("passwd").and_then(|v| v.as_str());
                let subnet = kwargs.get("subnet").and_then(|v| v.as_str());
                let out = self.manager.provision(&names, target, osimage, passwd, subnet, workers).await?;
                Ok(outcomes_to_json(out))
            }
            "clean" => {
                let names = names_of(&kwargs)?;
                let out = self.manager.clean(&names).await?;
                Ok(outcomes_to_json(out))
            }
            "provision_callback" => {
                let name = kwargs
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::MissingParameterValue("name".to_string()))?;
                let action = kwargs.get("action").cloned();
                self.manager.provision_callback(name, action).await
            }
            "check_support" | "enable_dhcp_option" | "restart_dhcp" => {
                Err(Error::not_found(xcat3_common::error::NotFoundKind::Plugin(format!("{method} is served by xcat3-network-agent, not the conductor"))))
            }
            other => Err(Error::not_found(xcat3_common::error::NotFoundKind::Plugin(other.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use xcat3_common::states::PowerTarget;
    use xcat3_db::{FakeStore, Node, Store};
    use xcat3_plugins::PluginRegistry;
    use xcat3_rpc::RpcHandler;

    async fn manager() -> ConductorManager {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();
        let registry = Arc::new(PluginRegistry::new());
        let task_manager = Arc::new(TaskManager::new(store.clone(), 3, Duration::from_millis(5)));
        let worker_pool = Arc::new(NodeWorkerPool::new(8, Duration::from_secs(5), 4));
        let network_client = Arc::new(NetworkClient::new(store.clone(), Arc::new(xcat3_rpc::InProcessTransport::new()), 60));
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            registry.clone(),
            task_manager.clone(),
            worker_pool.clone(),
            network_client,
            Arc::new(FetchOnlyProvisioner::new()),
            xcat3_plugins::boot::BootContext {
                tftp_dir: "/tmp/tftp".to_string(),
                install_dir: "/tmp/install".to_string(),
                host_ip: "10.0.0.1".to_string(),
            },
            xcat3_plugins::os::OsContext {
                install_dir: "/tmp/install".to_string(),
                host_ip: "10.0.0.1".to_string(),
                api_host_ip: "10.0.0.1".to_string(),
                api_port: 3000,
            },
            "/tmp/install".to_string(),
            "10.0.0.1".to_string(),
            1,
            None,
        ));
        ConductorManager::new(store, registry, task_manager, worker_pool, pipeline)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rpc_handler_dispatches_power_state_by_method_name() {
        let manager = Arc::new(manager().await);
        let handler = ConductorRpcHandler { manager };
        let kwargs = serde_json::json!({ "names": ["n1"], "target": "on", "workers": 1 });
        let result = handler.handle("change_power_state", kwargs).await.unwrap();
        let map: std::collections::HashMap<String, String> = serde_json::from_value(result).unwrap();
        assert_eq!(map["n1"], "SUCCESS");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rpc_handler_rejects_unknown_method() {
        let manager = Arc::new(manager().await);
        let handler = ConductorRpcHandler { manager };
        let err = handler.handle("does_not_exist", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, xcat3_common::Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn change_power_state_accepts_reboot_target() {
        let manager = Arc::new(manager().await);
        let out = manager.change_power_state(&["n1".to_string()], PowerTarget::Reboot, 1).await.unwrap();
        assert!(out["n1"].is_success());
    }
}
