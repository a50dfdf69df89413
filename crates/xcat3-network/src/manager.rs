//! C9 network service manager (§4.9): `reload_subnets` walks every
//! [`xcat3_db::Network`] row and matches it against a local interface
//! (via `pnet::datalink::interfaces`); `check_support`,
//! `enable_dhcp_option` and `restart_dhcp` are the RPC entry points
//! `xcat3-conductor`'s `NetworkClient` calls into.

use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnetwork::{IpNetwork, Ipv4Network};

use xcat3_common::Result;
use xcat3_db::Store;

use crate::dhcp::{netmask_to_prefix, IscDhcpService, SubnetOpts};

pub struct NetworkManager {
    store: Arc<dyn Store>,
    dhcp: Arc<IscDhcpService>,
}

impl NetworkManager {
    pub fn new(store: Arc<dyn Store>, dhcp: Arc<IscDhcpService>) -> Self {
        Self { store, dhcp }
    }

    /// Rebuilds and (re)starts the DHCP daemon once at startup, before
    /// serving any RPCs.
    pub async fn init(&self) -> Result<()> {
        self.restart_dhcp().await
    }

    async fn reload_subnets(&self) -> Result<()> {
        let networks = self.store.list_networks().await?;
        let interfaces = pnet::datalink::interfaces();
        self.dhcp.clear_subnets().await;
        for network in networks {
            let (Ok(subnet_addr), Ok(netmask_addr)) = (network.subnet.parse::<Ipv4Addr>(), network.netmask.parse::<Ipv4Addr>()) else {
                log::warn!("network_manager: network {} has an unparseable subnet/netmask", network.name);
                continue;
            };
            let netbits = netmask_to_prefix(netmask_addr);
            let Ok(subnet_net) = Ipv4Network::new(subnet_addr, netbits) else {
                log::warn!("network_manager: network {} has an invalid subnet/prefix", network.name);
                continue;
            };
            let matched = interfaces.iter().find_map(|iface| {
                iface.ips.iter().find_map(|ip| match ip {
                    IpNetwork::V4(v4) if subnet_net.contains(v4.ip()) => Some((iface.name.clone(), v4.ip())),
                    _ => None,
                })
            });
            let Some((nic, nic_ip)) = matched else {
                log::warn!(
                    "network_manager: no local interface in subnet {}/{} for network {}",
                    network.subnet,
                    network.netmask,
                    network.name
                );
                continue;
            };
            self.dhcp
                .add_subnet(SubnetOpts {
                    nic,
                    subnet: network.subnet.clone(),
                    netmask: network.netmask.clone(),
                    netbits,
                    conductor: nic_ip.to_string(),
                    next_server: nic_ip.to_string(),
                    router: network.gateway.clone().unwrap_or_else(|| nic_ip.to_string()),
                    domain_name: network.domain.clone(),
                    domain_name_servers: network.nameservers.clone(),
                    domain_search: network.domain.clone(),
                    subnet_id: network.subnet_id(),
                })
                .await;
        }
        Ok(())
    }

    /// RPC `restart_dhcp`: re-derive the subnet list from the store and
    /// local interfaces, rewrite `dhcpd.conf` and restart the daemon.
    pub async fn restart_dhcp(&self) -> Result<()> {
        log::info!("network_manager: restarting dhcp server");
        self.reload_subnets().await?;
        self.dhcp.build_conf(self.store.as_ref()).await?;
        self.dhcp.restart().await
    }

    /// RPC `check_support`: `false` unless the daemon is up with at
    /// least one subnet configured, and — if `subnet` (a network name)
    /// was given — that network's subnet is one we're currently serving.
    pub async fn check_support(&self, subnet: Option<&str>) -> Result<bool> {
        let opts = self.dhcp.subnet_opts().await;
        if opts.is_empty() || !self.dhcp.status().await {
            return Ok(false);
        }
        let Some(name) = subnet else {
            return Ok(true);
        };
        let Some(network) = self.store.get_network_by_name(name).await? else {
            return Ok(false);
        };
        Ok(opts.iter().any(|o| o.subnet_id == network.subnet_id()))
    }

    /// RPC `enable_dhcp_option`: the per-node blob was already written
    /// by the conductor (§4.7 step 6, §4.10); this just rebuilds the
    /// config file from the store and restarts the daemon so it takes
    /// effect.
    pub async fn enable_dhcp_option(&self, _subnet: Option<&str>) -> Result<()> {
        self.dhcp.build_conf(self.store.as_ref()).await?;
        self.dhcp.restart().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcat3_db::FakeStore;

    fn dhcp(dir: &std::path::Path) -> Arc<IscDhcpService> {
        Arc::new(IscDhcpService::new(dir.join("dhcpd.conf"), dir.join("dhcpd.pid"), dir.join("dhcpd.leases"), 7911, "s3cr3t".to_string()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_support_is_false_with_no_daemon_running() {
        let dir = std::env::temp_dir().join(format!("xcat3-network-manager-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let manager = NetworkManager::new(store, dhcp(&dir));
        assert!(!manager.check_support(None).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reload_subnets_skips_networks_with_no_matching_interface() {
        let dir = std::env::temp_dir().join(format!("xcat3-network-manager-test2-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        store
            .save_network(xcat3_db::Network::new("unreachable", "203.0.113.0", "255.255.255.0"))
            .await
            .unwrap();
        let manager = NetworkManager::new(store, dhcp(&dir));
        manager.reload_subnets().await.unwrap();
        assert!(manager.dhcp.subnet_opts().await.is_empty());
    }
}
