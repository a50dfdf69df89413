//! The `Store` trait is the object layer's (C2, §4.2) external contract:
//! bulk operations over typed records, plus the conditional reservation
//! update C1/§4.1 requires. `MysqlStore` (`pool.rs`) and `FakeStore`
//! (`fake.rs`) both implement it, so the conductor/pipeline/dispatcher
//! code in `xcat3-conductor` never has to know which backs it — the
//! seed end-to-end tests (§8a) run against `FakeStore`.

use crate::dhcp::DhcpBlob;
use crate::network::Network;
use crate::nic::Nic;
use crate::node::Node;
use crate::osimage::OsImage;
use crate::passwd::Passwd;
use crate::service::Service;
use async_trait::async_trait;
use xcat3_common::states::ServiceKind;
use xcat3_common::Result;

#[async_trait]
pub trait Store: Send + Sync {
    /// Batch size < 15 uses serial create with per-name duplicate
    /// detection; ≥ 15 pre-filters duplicates against existing names
    /// before a single bulk insert (§6 boundary behavior).
    async fn create_nodes(&self, nodes: Vec<Node>) -> Result<Vec<(String, Result<()>)>>;

    async fn list_in(&self, names: &[String], want_nics: bool) -> Result<Vec<Node>>;

    /// `GET /v1/nodes`: every node name in the store (§6).
    async fn list_node_names(&self) -> Result<Vec<String>>;

    /// Persists only `changed_fields()` per node, batched per table
    /// (§4.2).
    async fn save_nodes(&self, nodes: &[Node]) -> Result<()>;

    /// Refuses any node with `state = DEPLOY_NODESET` (§9 resolved
    /// ambiguity); returns the refused names without touching them.
    async fn destroy_nodes(&self, names: &[String]) -> Result<Vec<String>>;

    /// Atomic conditional update (§4.1): either every name in `names`
    /// moves `free -> held-by(tag)`, or none does.
    async fn reserve_many(&self, tag: &str, names: &[String]) -> Result<()>;

    async fn release_many(&self, tag: &str, names: &[String]) -> Result<()>;

    async fn create_nic(&self, nic: Nic) -> Result<Nic>;

    /// `/v1/nics` CRUD (§6).
    async fn list_nics(&self) -> Result<Vec<Nic>>;

    async fn get_nic(&self, uuid: &str) -> Result<Option<Nic>>;

    /// Persists only `changed_fields()`, matching `save_nodes`'s
    /// change-tracking contract (§4.2).
    async fn save_nic(&self, nic: &Nic) -> Result<()>;

    async fn destroy_nic(&self, uuid: &str) -> Result<()>;

    async fn save_or_update_dhcp(&self, blobs: Vec<DhcpBlob>) -> Result<()>;

    async fn destroy_dhcp(&self, names: &[String]) -> Result<()>;

    async fn get_dhcp_list(&self) -> Result<Vec<DhcpBlob>>;

    async fn list_networks(&self) -> Result<Vec<Network>>;

    async fn get_network_by_name(&self, name: &str) -> Result<Option<Network>>;

    async fn save_network(&self, network: Network) -> Result<Network>;

    /// Any change broadcasts `restart_dhcp` to every network-service
    /// worker (§3, §4.9); the broadcast itself is the caller's job, this
    /// only removes the row.
    async fn destroy_network(&self, name: &str) -> Result<()>;

    async fn get_osimage(&self, id: u64) -> Result<Option<OsImage>>;

    async fn find_osimage_by_name(&self, name: &str) -> Result<Option<OsImage>>;

    async fn list_osimages(&self) -> Result<Vec<OsImage>>;

    async fn save_osimage(&self, image: OsImage) -> Result<OsImage>;

    /// Removes the osimage record; the conductor is responsible for the
    /// on-disk install tree (§4.7), this only drops the catalog row.
    /// Callers must check [`Store::count_nodes_with_osimage`] first —
    /// the OSImage lifecycle (§3) forbids deleting a still-referenced
    /// image, and this method does not enforce that itself.
    async fn destroy_osimage(&self, name: &str) -> Result<()>;

    /// Count of nodes whose `osimage_id` points at `id` (§3 "destroyed
    /// only if no Node references it").
    async fn count_nodes_with_osimage(&self, id: u64) -> Result<u64>;

    async fn get_passwd(&self, key: &str) -> Result<Option<Passwd>>;

    async fn list_passwds(&self) -> Result<Vec<Passwd>>;

    async fn save_passwd(&self, passwd: Passwd) -> Result<Passwd>;

    async fn destroy_passwd(&self, key: &str) -> Result<()>;

    /// First registration of `(hostname, kind)`; re-registering an
    /// already-online service on the non-update path is a conflict
    /// (§7 `ServiceAlreadyRegistered`).
    async fn register_service(&self, service: Service) -> Result<Service>;

    async fn heartbeat(&self, hostname: &str, kind: ServiceKind) -> Result<()>;

    /// Routers MUST call this per request; no caching allowed (§5).
    async fn live_services(&self, kind: ServiceKind, heartbeat_timeout_secs: i64) -> Result<Vec<Service>>;

    async fn find_service_by_id(&self, id: u64) -> Result<Option<Service>>;
}
