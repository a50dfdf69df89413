//! The `xcat3.network_manager.<hostname>` RPC surface (§4.9). The exact
//! complement of `xcat3-conductor`'s `ConductorRpcHandler`, which
//! returns 404 for these same three method names — a request for
//! anything else belongs to the conductor, not here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use xcat3_common::error::NotFoundKind;
use xcat3_common::{Error, Result};
use xcat3_rpc::RpcHandler;

use crate::manager::NetworkManager;

pub struct NetworkRpcHandler {
    pub manager: Arc<NetworkManager>,
}

#[async_trait]
impl RpcHandler for NetworkRpcHandler {
    async fn handle(&self, method: &str, kwargs: Value) -> Result<Value> {
        match method {
            "check_support" => {
                let subnet = kwargs.get("subnet").and_then(|v| v.as_str());
                let support = self.manager.check_support(subnet).await?;
                Ok(json!(support))
            }
            "enable_dhcp_option" => {
                let subnet = kwargs.get("subnet").and_then(|v| v.as_str());
                self.manager.enable_dhcp_option(subnet).await?;
                Ok(json!({}))
            }
            "restart_dhcp" => {
                self.manager.restart_dhcp().await?;
                Ok(json!({}))
            }
            other => Err(Error::not_found(NotFoundKind::Plugin(format!("{other} is served by xcat3-conductor, not the network agent")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::IscDhcpService;
    use std::sync::Arc;
    use xcat3_db::{FakeStore, Store};

    async fn handler(tmp: &std::path::Path) -> NetworkRpcHandler {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let dhcp = Arc::new(IscDhcpService::new(tmp.join("dhcpd.conf"), tmp.join("dhcpd.pid"), tmp.join("dhcpd.leases"), 7911, "secret".to_string()));
        let manager = Arc::new(NetworkManager::new(store, dhcp));
        NetworkRpcHandler { manager }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_support_is_false_with_no_subnets_configured() {
        let dir = std::env::temp_dir().join(format!("xcat3-network-handler-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let h = handler(&dir).await;
        let result = h.handle("check_support", json!({})).await.unwrap();
        assert_eq!(result, json!(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_method_is_not_found() {
        let dir = std::env::temp_dir().join(format!("xcat3-network-handler-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let h = handler(&dir).await;
        let err = h.handle("change_power_state", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
