//! The conductor-side caller of the network service's RPC surface
//! (§4.7 step 7, §4.9 routing). `route_and_call` implements
//! `get_topic_for(subnet)`: probe every live network service's
//! `check_support(subnet)` and call the first `true` responder; with no
//! `subnet` given, any live network service will do.

use std::sync::Arc;

use serde_json::json;
use xcat3_common::error::NotFoundKind;
use xcat3_common::states::ServiceKind;
use xcat3_common::{Error, Result};
use xcat3_db::Store;
use xcat3_rpc::{topic_for, RpcEnvelope, Transport};

pub struct NetworkClient {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    heartbeat_timeout_secs: i64,
}

impl NetworkClient {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>, heartbeat_timeout_secs: i64) -> Self {
        Self {
            store,
            transport,
            heartbeat_timeout_secs,
        }
    }

    async fn route(&self, subnet: Option<&str>) -> Result<String> {
        let services = self.store.live_services(ServiceKind::Network, self.heartbeat_timeout_secs).await?;
        if services.is_empty() {
            return Err(Error::not_found(NotFoundKind::NoValidHost));
        }
        let Some(subnet) = subnet else {
            return Ok(services[0].hostname.clone());
        };
        for svc in &services {
            let topic = topic_for(ServiceKind::Network, &svc.hostname);
            let envelope = RpcEnvelope::new("check_support", json!({ "subnet": subnet }));
            if let Ok(reply) = self.transport.call(&svc.hostname, &topic, envelope).await {
                if reply.as_bool().unwrap_or(false) {
                    return Ok(svc.hostname.clone());
                }
            }
        }
        Err(Error::not_found(NotFoundKind::NoValidHost))
    }

    /// §4.7 step 7: one synchronous call to whichever network-service
    /// worker owns `subnet` (or any live one, if `subnet` is `None`).
    pub async fn enable_dhcp_option(&self, subnet: Option<&str>) -> Result<()> {
        let hostname = self.route(subnet).await?;
        let topic = topic_for(ServiceKind::Network, &hostname);
        let envelope = RpcEnvelope::new("enable_dhcp_option", json!({ "subnet": subnet }));
        self.transport.call(&hostname, &topic, envelope).await?;
        Ok(())
    }

    /// §4.9 broadcast: fire-and-forget `restart_dhcp` cast to every live
    /// network service, triggered by any Network record mutation.
    pub async fn broadcast_restart(&self) -> Result<()> {
        let services = self.store.live_services(ServiceKind::Network, self.heartbeat_timeout_secs).await?;
        for svc in services {
            let topic = topic_for(ServiceKind::Network, &svc.hostname);
            let envelope = RpcEnvelope::new("restart_dhcp", json!({}));
            let _ = self.transport.cast(&svc.hostname, &topic, envelope).await;
        }
        Ok(())
    }
}
