//! C4 Service registry & heartbeat (§4.4 loading, §5 "routers MUST
//! re-query"). A thin periodic-task wrapper around `Store::register_service`
//! / `Store::heartbeat`; every worker binary (`xcat3-api`,
//! `xcat3-conductor`, `xcat3-network-agent`) owns exactly one of these
//! for its own identity. Lives here rather than in `xcat3-conductor` so
//! `xcat3-network`'s binary can depend on it without reaching into the
//! conductor crate for an unrelated concern.

use std::sync::Arc;
use std::time::Duration;

use xcat3_common::states::ServiceKind;
use xcat3_common::Result;

use crate::service::Service;
use crate::store::Store;

pub struct ServiceRegistration {
    store: Arc<dyn Store>,
    pub hostname: String,
    pub kind: ServiceKind,
    heartbeat_interval: Duration,
}

impl ServiceRegistration {
    /// Registers `(hostname, kind, workers)` and returns the handle used
    /// to drive the periodic heartbeat. Re-registering a hostname that's
    /// already online for this kind is a conflict (`ServiceAlreadyRegistered`,
    /// §7) — a crashed worker restarting under the same hostname must
    /// wait for its prior row's heartbeat to go stale, or an operator
    /// must clear it, rather than silently double-registering.
    pub async fn register(store: Arc<dyn Store>, hostname: impl Into<String>, kind: ServiceKind, workers: u32, heartbeat_interval: Duration) -> Result<(Self, Service)> {
        let hostname = hostname.into();
        let service = store.register_service(Service::new(hostname.clone(), kind, workers)).await?;
        Ok((
            Self {
                store,
                hostname,
                kind,
                heartbeat_interval,
            },
            service,
        ))
    }

    /// Runs the heartbeat loop forever; the caller spawns this as its own
    /// task. A missed heartbeat write is logged and retried on the next
    /// tick rather than treated as fatal — a transient DB hiccup should
    /// not kill the worker process.
    pub async fn run_heartbeat(&self) -> ! {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.store.heartbeat(&self.hostname, self.kind).await {
                log::warn!("service_registry: heartbeat for {} ({:?}) failed: {e}", self.hostname, self.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeStore;

    #[tokio::test]
    async fn registering_twice_online_is_a_conflict() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let (_reg, _svc) = ServiceRegistration::register(store.clone(), "conductor-1", ServiceKind::Conductor, 4, Duration::from_secs(5))
            .await
            .unwrap();
        let err = ServiceRegistration::register(store, "conductor-1", ServiceKind::Conductor, 4, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, xcat3_common::Error::ServiceAlreadyRegistered("conductor-1".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_tick_refreshes_liveness() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let (reg, svc) = ServiceRegistration::register(store.clone(), "conductor-1", ServiceKind::Conductor, 4, Duration::from_millis(10))
            .await
            .unwrap();
        let handle = tokio::spawn(async move { reg.run_heartbeat().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.abort();
        let live = store.live_services(ServiceKind::Conductor, 60).await.unwrap();
        assert!(live.iter().any(|s| s.id == svc.id));
    }
}
