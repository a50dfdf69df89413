//! In-memory `Store` implementation (§8a test tooling) used by the seed
//! end-to-end scenario tests so they don't require a live MySQL
//! instance to reason about.

use crate::dhcp::DhcpBlob;
use crate::network::Network;
use crate::nic::Nic;
use crate::node::Node;
use crate::osimage::OsImage;
use crate::passwd::Passwd;
use crate::service::Service;
use crate::store::Store;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use xcat3_common::error::{ConflictKind, NotFoundKind};
use xcat3_common::states::ServiceKind;
use xcat3_common::{Error, Result};

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    nics: HashMap<String, Nic>,
    networks: HashMap<String, Network>,
    osimages: HashMap<u64, OsImage>,
    osimage_seq: u64,
    passwds: HashMap<String, Passwd>,
    dhcp: HashMap<String, DhcpBlob>,
    services: HashMap<u64, Service>,
    service_seq: u64,
    node_seq: u64,
}

pub struct FakeStore {
    inner: Mutex<Inner>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn create_nodes(&self, nodes: Vec<Node>) -> Result<Vec<(String, Result<()>)>> {
        let mut inner = self.inner.lock().unwrap();
        let mut results = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let name = node.name.clone();
            if inner.nodes.contains_key(&name) {
                results.push((
                    name,
                    Err(Error::conflict(ConflictKind::DuplicateName(
                        "duplicate name".to_string(),
                    ))),
                ));
                continue;
            }
            inner.node_seq += 1;
            node.id = Some(inner.node_seq);
            for nic in &mut node.nics {
                inner.node_seq += 1;
                nic.node_id = Some(node.id.unwrap());
                inner.nics.insert(nic.mac.clone(), nic.clone());
            }
            inner.nodes.insert(name.clone(), node);
            results.push((name, Ok(())));
        }
        Ok(results)
    }

    async fn list_in(&self, names: &[String], want_nics: bool) -> Result<Vec<Node>> {
        let inner = self.inner.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|n| inner.nodes.get(n))
            .map(|n| {
                let mut node = n.clone();
                if want_nics {
                    node.nics = inner
                        .nics
                        .values()
                        .filter(|nic| nic.node_id == node.id)
                        .cloned()
                        .collect();
                } else {
                    node.nics.clear();
                }
                node
            })
            .collect())
    }

    async fn list_node_names(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nodes.keys().cloned().collect())
    }

    async fn save_nodes(&self, nodes: &[Node]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for node in nodes {
            inner.nodes.insert(node.name.clone(), node.clone());
        }
        Ok(())
    }

    async fn destroy_nodes(&self, names: &[String]) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().unwrap();
        let mut refused = Vec::new();
        for name in names {
            let may_destroy = inner.nodes.get(name).map(|n| n.may_be_destroyed()).unwrap_or(true);
            if !may_destroy {
                refused.push(name.clone());
                continue;
            }
            inner.nodes.remove(name);
            inner.dhcp.remove(name);
        }
        Ok(refused)
    }

    async fn reserve_many(&self, tag: &str, names: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let all_free = names
            .iter()
            .all(|n| inner.nodes.get(n).map(|node| node.is_free()).unwrap_or(false));
        if !all_free {
            return Err(Error::conflict(ConflictKind::NodeLocked(names.join(","))));
        }
        for name in names {
            if let Some(node) = inner.nodes.get_mut(name) {
                node.reservation = Some(tag.to_string());
            }
        }
        Ok(())
    }

    async fn release_many(&self, _tag: &str, names: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for name in names {
            if let Some(node) = inner.nodes.get_mut(name) {
                node.reservation = None;
            }
        }
        Ok(())
    }

    async fn create_nic(&self, nic: Nic) -> Result<Nic> {
        let mut inner = self.inner.lock().unwrap();
        if inner.nics.contains_key(&nic.mac) {
            return Err(Error::conflict(ConflictKind::MacAlreadyExists(nic.mac)));
        }
        inner.nics.insert(nic.mac.clone(), nic.clone());
        Ok(nic)
    }

    async fn list_nics(&self) -> Result<Vec<Nic>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nics.values().cloned().collect())
    }

    async fn get_nic(&self, uuid: &str) -> Result<Option<Nic>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nics.values().find(|n| n.uuid == uuid).cloned())
    }

    async fn save_nic(&self, nic: &Nic) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nics.insert(nic.mac.clone(), nic.clone());
        Ok(())
    }

    async fn destroy_nic(&self, uuid: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.nics.retain(|_, n| n.uuid != uuid);
        Ok(())
    }

    async fn save_or_update_dhcp(&self, blobs: Vec<DhcpBlob>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for blob in blobs {
            inner.dhcp.insert(blob.name.clone(), blob);
        }
        Ok(())
    }

    async fn destroy_dhcp(&self, names: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for name in names {
            inner.dhcp.remove(name);
        }
        Ok(())
    }

    async fn get_dhcp_list(&self) -> Result<Vec<DhcpBlob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.dhcp.values().cloned().collect())
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.networks.values().cloned().collect())
    }

    async fn get_network_by_name(&self, name: &str) -> Result<Option<Network>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.networks.get(name).cloned())
    }

    async fn save_network(&self, mut network: Network) -> Result<Network> {
        let mut inner = self.inner.lock().unwrap();
        if network.id.is_none() {
            inner.node_seq += 1;
            network.id = Some(inner.node_seq);
        }
        inner.networks.insert(network.name.clone(), network.clone());
        Ok(network)
    }

    async fn destroy_network(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.networks.remove(name);
        Ok(())
    }

    async fn get_osimage(&self, id: u64) -> Result<Option<OsImage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.osimages.get(&id).cloned())
    }

    async fn find_osimage_by_name(&self, name: &str) -> Result<Option<OsImage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.osimages.values().find(|i| i.name == name).cloned())
    }

    async fn list_osimages(&self) -> Result<Vec<OsImage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.osimages.values().cloned().collect())
    }

    async fn save_osimage(&self, mut image: OsImage) -> Result<OsImage> {
        let mut inner = self.inner.lock().unwrap();
        if image.id.is_none() {
            inner.osimage_seq += 1;
            image.id = Some(inner.osimage_seq);
        }
        inner.osimages.insert(image.id.unwrap(), image.clone());
        Ok(image)
    }

    async fn destroy_osimage(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.osimages.retain(|_, img| img.name != name);
        Ok(())
    }

    async fn count_nodes_with_osimage(&self, id: u64) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nodes.values().filter(|n| n.osimage_id == Some(id)).count() as u64)
    }

    async fn get_passwd(&self, key: &str) -> Result<Option<Passwd>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.passwds.get(key).cloned())
    }

    async fn list_passwds(&self) -> Result<Vec<Passwd>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.passwds.values().cloned().collect())
    }

    async fn save_passwd(&self, passwd: Passwd) -> Result<Passwd> {
        let mut inner = self.inner.lock().unwrap();
        inner.passwds.insert(passwd.key.clone(), passwd.clone());
        Ok(passwd)
    }

    async fn destroy_passwd(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.passwds.remove(key);
        Ok(())
    }

    async fn register_service(&self, mut service: Service) -> Result<Service> {
        let mut inner = self.inner.lock().unwrap();
        let already = inner
            .services
            .values()
            .any(|s| s.hostname == service.hostname && s.kind == service.kind && s.online);
        if already {
            return Err(Error::ServiceAlreadyRegistered(service.hostname));
        }
        inner.service_seq += 1;
        service.id = Some(inner.service_seq);
        inner.services.insert(service.id.unwrap(), service.clone());
        Ok(service)
    }

    async fn heartbeat(&self, hostname: &str, kind: ServiceKind) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(svc) = inner
            .services
            .values_mut()
            .find(|s| s.hostname == hostname && s.kind == kind)
        {
            svc.updated_at = chrono::Utc::now();
            Ok(())
        } else {
            Err(Error::not_found(NotFoundKind::Service(hostname.to_string())))
        }
    }

    async fn live_services(&self, kind: ServiceKind, heartbeat_timeout_secs: i64) -> Result<Vec<Service>> {
        let inner = self.inner.lock().unwrap();
        let now = chrono::Utc::now();
        Ok(inner
            .services
            .values()
            .filter(|s| s.kind == kind && s.is_live(now, heartbeat_timeout_secs))
            .cloned()
            .collect())
    }

    async fn find_service_by_id(&self, id: u64) -> Result<Option<Service>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.services.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::Nic;

    #[tokio::test]
    async fn reserve_many_is_all_or_nothing() {
        let store = FakeStore::new();
        let mut node = Node::new("n1", "ipmi", "pxe");
        node.nics.push(Nic::new("aa:bb:cc:dd:ee:ff"));
        store.create_nodes(vec![node]).await.unwrap();

        store.reserve_many("tag_a", &["n1".to_string()]).await.unwrap();
        let err = store
            .reserve_many("tag_b", &["n1".to_string()])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::conflict(ConflictKind::NodeLocked("n1".to_string()))
        );
    }

    #[tokio::test]
    async fn duplicate_create_reports_per_name_without_failing_batch() {
        let store = FakeStore::new();
        store
            .create_nodes(vec![Node::new("n1", "ipmi", "pxe")])
            .await
            .unwrap();
        let results = store
            .create_nodes(vec![Node::new("n1", "ipmi", "pxe"), Node::new("n2", "ipmi", "pxe")])
            .await
            .unwrap();
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[tokio::test]
    async fn destroy_refuses_nodes_in_deploy_nodeset() {
        let store = FakeStore::new();
        let mut node = Node::new("n1", "ipmi", "pxe");
        node.state = xcat3_common::ProvisionState::DeployNodeset;
        store.create_nodes(vec![node]).await.unwrap();
        let refused = store.destroy_nodes(&["n1".to_string()]).await.unwrap();
        assert_eq!(refused, vec!["n1".to_string()]);
        assert_eq!(store.list_in(&["n1".to_string()], false).await.unwrap().len(), 1);
    }
}
