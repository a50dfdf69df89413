//! MySQL-backed `Store` (C1, §4.1): a typed, per-entity store with the
//! bulk/conditional operations the object layer needs. The `mysql`
//! crate is synchronous, so every call below hops onto a blocking
//! thread via `tokio::task::spawn_blocking` rather than holding the
//! async executor hostage for the duration of a query.

use crate::dhcp::DhcpBlob;
use crate::network::Network;
use crate::nic::Nic;
use crate::node::{ControlInfo, Node};
use crate::osimage::OsImage;
use crate::passwd::Passwd;
use crate::record::Entity;
use crate::service::Service;
use crate::store::Store;
use async_trait::async_trait;
use chrono::Utc;
use mysql::prelude::Queryable;
use mysql::{params, Pool, TxOpts};
use xcat3_common::error::{ConflictKind, NotFoundKind};
use xcat3_common::states::{ProvisionState, ServiceKind};
use xcat3_common::{Error, Result};

pub struct MysqlStore {
    pool: Pool,
}

fn provision_state_to_db(state: ProvisionState) -> &'static str {
    state.as_wire()
}

fn provision_state_from_db(s: &str) -> ProvisionState {
    match s {
        "deploy_dhcp" => ProvisionState::DeployDhcp,
        "deploy_nodeset" => ProvisionState::DeployNodeset,
        "deploy_done" => ProvisionState::DeployDone,
        _ => ProvisionState::Undeployed,
    }
}

fn db_err(e: mysql::Error) -> Error {
    Error::Unclassified(e.to_string())
}

impl MysqlStore {
    /// `mysql::Pool::new` pools its own connections; the workers here
    /// share one `Pool` per process (a single shared handle, cloned
    /// cheaply).
    pub fn connect(url: &str) -> Result<Self> {
        let pool = Pool::new(url).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn get_conn(&self) -> Result<mysql::PooledConn> {
        self.pool.get_conn().map_err(db_err)
    }
}

#[async_trait]
impl Store for MysqlStore {
    async fn create_nodes(&self, nodes: Vec<Node>) -> Result<Vec<(String, Result<()>)>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<(String, Result<()>)>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            // §6 boundary behavior: batch size < 15 is a serial create
            // with per-name duplicate detection; >= 15 pre-filters
            // duplicates against existing names before one bulk insert.
            if nodes.len() < 15 {
                let mut results = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let name = node.name.clone();
                    let outcome = insert_one_node(&mut conn, &node);
                    results.push((name, outcome));
                }
                Ok(results)
            } else {
                let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
                let existing: Vec<String> = conn
                    .exec_map(
                        format!(
                            "SELECT name FROM nodes WHERE name IN ({})",
                            placeholders(names.len())
                        ),
                        names.clone(),
                        |name: String| name,
                    )
                    .map_err(db_err)?;
                let existing: std::collections::HashSet<String> = existing.into_iter().collect();
                let mut results = Vec::with_capacity(nodes.len());
                let mut tx = conn.start_transaction(TxOpts::default()).map_err(db_err)?;
                for node in nodes {
                    let name = node.name.clone();
                    if existing.contains(&name) {
                        results.push((
                            name,
                            Err(Error::conflict(ConflictKind::DuplicateName(
                                "duplicate name".to_string(),
                            ))),
                        ));
                        continue;
                    }
                    let outcome = insert_one_node_tx(&mut tx, &node);
                    results.push((name, outcome));
                }
                tx.commit().map_err(db_err)?;
                Ok(results)
            }
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_in(&self, names: &[String], want_nics: bool) -> Result<Vec<Node>> {
        let pool = self.pool.clone();
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Vec<Node>> {
            if names.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, String, String, String, String, String, Option<String>, String, Option<String>, Option<String>, Option<u64>, Option<u64>, Option<u64>)> = conn
                .exec(
                    format!(
                        "SELECT id, name, mgt, netboot, arch, node_type, state, task_action, \
                         control_info, console_info, reservation, conductor_affinity, \
                         osimage_id, passwd_id FROM nodes WHERE name IN ({})",
                        placeholders(names.len())
                    ),
                    names.clone(),
                )
                .map_err(db_err)?;

            let mut nodes: Vec<Node> = rows
                .into_iter()
                .map(|(id, name, mgt, netboot, arch, node_type, state, task_action,
                       control_info, console_info, reservation, conductor_affinity,
                       osimage_id, passwd_id)| {
                    let mut node = Node::new(name, mgt, netboot);
                    node.id = Some(id);
                    node.arch = arch;
                    node.node_type = node_type;
                    node.state = provision_state_from_db(&state);
                    node.task_action = task_action;
                    node.control_info = serde_json::from_str(&control_info)
                        .unwrap_or(ControlInfo::Unknown(serde_json::Value::Null));
                    node.console_info = console_info.and_then(|s| serde_json::from_str(&s).ok());
                    node.reservation = reservation;
                    node.conductor_affinity = conductor_affinity;
                    node.osimage_id = osimage_id;
                    node.passwd_id = passwd_id;
                    node.clear_changed();
                    node
                })
                .collect();

            if want_nics && !nodes.is_empty() {
                let node_ids: Vec<u64> = nodes.iter().filter_map(|n| n.id).collect();
                let nic_rows: Vec<(u64, String, String, Option<String>, Option<String>, Option<String>, Option<u64>, bool, String)> = conn
                    .exec(
                        format!(
                            "SELECT id, uuid, mac, name, ip, netmask, node_id, `primary`, extra \
                             FROM nics WHERE node_id IN ({})",
                            placeholders(node_ids.len())
                        ),
                        node_ids,
                    )
                    .map_err(db_err)?;
                for (id, uuid, mac, name, ip, netmask, node_id, primary, extra) in nic_rows {
                    let mut nic = Nic::new(mac);
                    nic.id = Some(id);
                    nic.uuid = uuid;
                    nic.name = name;
                    nic.ip = ip;
                    nic.netmask = netmask;
                    nic.node_id = node_id;
                    nic.primary = primary;
                    nic.extra = serde_json::from_str(&extra).unwrap_or(serde_json::Value::Null);
                    nic.clear_changed();
                    if let Some(node) = nodes.iter_mut().find(|n| n.id == node_id) {
                        node.nics.push(nic);
                    }
                }
            }
            Ok(nodes)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_node_names(&self) -> Result<Vec<String>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.query("SELECT name FROM nodes").map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_nodes(&self, nodes: &[Node]) -> Result<()> {
        let pool = self.pool.clone();
        let nodes = nodes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut tx = conn.start_transaction(TxOpts::default()).map_err(db_err)?;
            for node in &nodes {
                // §4.2: persist only `changed_fields()`, one statement per
                // node (batched per-table bulk update is the MySQL
                // multi-row `ON DUPLICATE KEY UPDATE` idiom; per-row here
                // keeps the changed-field projection simple and correct).
                if node.changed_fields().is_empty() {
                    continue;
                }
                let id = node.id.ok_or_else(|| {
                    Error::not_found(NotFoundKind::Node(node.name.clone()))
                })?;
                let mut sets: Vec<(&str, mysql::Value)> = Vec::new();
                if node.changed_fields().contains("mgt") {
                    sets.push(("mgt", node.mgt.clone().into()));
                }
                if node.changed_fields().contains("netboot") {
                    sets.push(("netboot", node.netboot.clone().into()));
                }
                if node.changed_fields().contains("arch") {
                    sets.push(("arch", node.arch.clone().into()));
                }
                if node.changed_fields().contains("node_type") {
                    sets.push(("node_type", node.node_type.clone().into()));
                }
                if node.changed_fields().contains("state") {
                    sets.push(("state", provision_state_to_db(node.state).to_string().into()));
                }
                if node.changed_fields().contains("task_action") {
                    sets.push(("task_action", node.task_action.clone().into()));
                }
                if node.changed_fields().contains("control_info") {
                    sets.push(("control_info", serde_json::to_string(&node.control_info).unwrap_or_default().into()));
                }
                if node.changed_fields().contains("console_info") {
                    sets.push(("console_info", node.console_info.as_ref().map(|v| v.to_string()).into()));
                }
                if node.changed_fields().contains("conductor_affinity") {
                    sets.push((
                        "conductor_affinity",
                        node.conductor_affinity.map(|v| v.to_string()).unwrap_or_default().into(),
                    ));
                }
                if node.changed_fields().contains("osimage_id") {
                    sets.push((
                        "osimage_id",
                        node.osimage_id.map(|v| v.to_string()).unwrap_or_default().into(),
                    ));
                }
                if node.changed_fields().contains("passwd_id") {
                    sets.push(("passwd_id", node.passwd_id.into()));
                }
                if node.changed_fields().contains("last_error") {
                    sets.push(("last_error", node.last_error.clone().into()));
                }
                if sets.is_empty() {
                    continue;
                }
                let assignments = sets
                    .iter()
                    .map(|(k, _)| format!("{k} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut params: Vec<mysql::Value> =
                    sets.into_iter().map(|(_, v)| v).collect();
                params.push(id.into());
                tx.exec_drop(format!("UPDATE nodes SET {assignments} WHERE id = ?"), params)
                    .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_nodes(&self, names: &[String]) -> Result<Vec<String>> {
        let pool = self.pool.clone();
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            if names.is_empty() {
                return Ok(Vec::new());
            }
            let states: Vec<(String, String)> = conn
                .exec(
                    format!(
                        "SELECT name, state FROM nodes WHERE name IN ({})",
                        placeholders(names.len())
                    ),
                    names.clone(),
                )
                .map_err(db_err)?;
            let refused: Vec<String> = states
                .iter()
                .filter(|(_, state)| state == "deploy_nodeset")
                .map(|(name, _)| name.clone())
                .collect();
            let deletable: Vec<String> = names
                .iter()
                .filter(|n| !refused.contains(n))
                .cloned()
                .collect();
            if !deletable.is_empty() {
                let mut tx = conn.start_transaction(TxOpts::default()).map_err(db_err)?;
                tx.exec_drop(
                    format!(
                        "DELETE FROM nics WHERE node_id IN (SELECT id FROM nodes WHERE name IN ({}))",
                        placeholders(deletable.len())
                    ),
                    deletable.clone(),
                )
                .map_err(db_err)?;
                tx.exec_drop(
                    format!("DELETE FROM dhcp_opts WHERE name IN ({})", placeholders(deletable.len())),
                    deletable.clone(),
                )
                .map_err(db_err)?;
                tx.exec_drop(
                    format!("DELETE FROM nodes WHERE name IN ({})", placeholders(deletable.len())),
                    deletable,
                )
                .map_err(db_err)?;
                tx.commit().map_err(db_err)?;
            }
            Ok(refused)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn reserve_many(&self, tag: &str, names: &[String]) -> Result<()> {
        let pool = self.pool.clone();
        let tag = tag.to_string();
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            // §4.1/§4.4: a single conditional UPDATE; the affected-row
            // count must equal the request size or the whole attempt is
            // rolled back and reported as `NodeLocked` (all-or-nothing).
            let mut tx = conn.start_transaction(TxOpts::default()).map_err(db_err)?;
            let mut params: Vec<mysql::Value> = Vec::with_capacity(names.len() + 1);
            params.push(tag.clone().into());
            params.extend(names.iter().cloned().map(mysql::Value::from));
            tx.exec_drop(
                format!(
                    "UPDATE nodes SET reservation = ? WHERE name IN ({}) AND reservation IS NULL",
                    placeholders(names.len())
                ),
                params,
            )
            .map_err(db_err)?;
            let affected = tx.affected_rows();
            if affected as usize != names.len() {
                tx.rollback().map_err(db_err)?;
                return Err(Error::conflict(ConflictKind::NodeLocked(names.join(","))));
            }
            tx.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn release_many(&self, tag: &str, names: &[String]) -> Result<()> {
        let pool = self.pool.clone();
        let tag = tag.to_string();
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut params: Vec<mysql::Value> = names.iter().cloned().map(mysql::Value::from).collect();
            params.push(tag.into());
            conn.exec_drop(
                format!(
                    "UPDATE nodes SET reservation = NULL WHERE name IN ({}) AND reservation = ?",
                    placeholders(names.len())
                ),
                params,
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn create_nic(&self, nic: Nic) -> Result<Nic> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Nic> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let existing: Option<u64> = conn
                .exec_first("SELECT id FROM nics WHERE mac = :mac", params! { "mac" => &nic.mac })
                .map_err(db_err)?;
            if existing.is_some() {
                return Err(Error::conflict(ConflictKind::MacAlreadyExists(nic.mac)));
            }
            conn.exec_drop(
                "INSERT INTO nics (uuid, mac, name, ip, netmask, node_id, `primary`, extra) \
                 VALUES (:uuid, :mac, :name, :ip, :netmask, :node_id, :primary, :extra)",
                params! {
                    "uuid" => &nic.uuid,
                    "mac" => &nic.mac,
                    "name" => &nic.name,
                    "ip" => &nic.ip,
                    "netmask" => &nic.netmask,
                    "node_id" => nic.node_id,
                    "primary" => nic.primary,
                    "extra" => nic.extra.to_string(),
                },
            )
            .map_err(db_err)?;
            let mut nic = nic;
            nic.set_id(conn.last_insert_id());
            Ok(nic)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_nics(&self) -> Result<Vec<Nic>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Nic>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, String, Option<String>, Option<String>, Option<String>, Option<u64>, bool, String)> = conn
                .query("SELECT id, uuid, mac, name, ip, netmask, node_id, `primary`, extra FROM nics")
                .map_err(db_err)?;
            Ok(rows.into_iter().map(nic_from_row).collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn get_nic(&self, uuid: &str) -> Result<Option<Nic>> {
        let pool = self.pool.clone();
        let uuid = uuid.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Nic>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let row: Option<(u64, String, String, Option<String>, Option<String>, Option<String>, Option<u64>, bool, String)> = conn
                .exec_first(
                    "SELECT id, uuid, mac, name, ip, netmask, node_id, `primary`, extra FROM nics WHERE uuid = :uuid",
                    params! { "uuid" => &uuid },
                )
                .map_err(db_err)?;
            Ok(row.map(nic_from_row))
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_nic(&self, nic: &Nic) -> Result<()> {
        let pool = self.pool.clone();
        let nic = nic.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if nic.changed_fields().is_empty() {
                return Ok(());
            }
            let mut conn = pool.get_conn().map_err(db_err)?;
            let id = nic.id.ok_or_else(|| Error::not_found(NotFoundKind::Nic(nic.uuid.clone())))?;
            conn.exec_drop(
                "UPDATE nics SET name = :name, ip = :ip, netmask = :netmask, node_id = :node_id, \
                 `primary` = :primary, extra = :extra WHERE id = :id",
                params! {
                    "name" => &nic.name,
                    "ip" => &nic.ip,
                    "netmask" => &nic.netmask,
                    "node_id" => nic.node_id,
                    "primary" => nic.primary,
                    "extra" => nic.extra.to_string(),
                    "id" => id,
                },
            )
            .map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_nic(&self, uuid: &str) -> Result<()> {
        let pool = self.pool.clone();
        let uuid = uuid.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.exec_drop("DELETE FROM nics WHERE uuid = :uuid", params! { "uuid" => &uuid }).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_or_update_dhcp(&self, blobs: Vec<DhcpBlob>) -> Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut tx = conn.start_transaction(TxOpts::default()).map_err(db_err)?;
            for blob in blobs {
                tx.exec_drop(
                    "INSERT INTO dhcp_opts (name, ip, mac, hostname, statements, content) \
                     VALUES (:name, :ip, :mac, :hostname, :statements, :content) \
                     ON DUPLICATE KEY UPDATE ip = :ip, mac = :mac, hostname = :hostname, \
                     statements = :statements, content = :content",
                    params! {
                        "name" => &blob.name,
                        "ip" => &blob.ip,
                        "mac" => &blob.mac,
                        "hostname" => &blob.hostname,
                        "statements" => &blob.statements,
                        "content" => &blob.content,
                    },
                )
                .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_dhcp(&self, names: &[String]) -> Result<()> {
        let pool = self.pool.clone();
        let names = names.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if names.is_empty() {
                return Ok(());
            }
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.exec_drop(
                format!("DELETE FROM dhcp_opts WHERE name IN ({})", placeholders(names.len())),
                names,
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn get_dhcp_list(&self) -> Result<Vec<DhcpBlob>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<DhcpBlob>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(String, Option<String>, Option<String>, String, String, String)> = conn
                .query("SELECT name, ip, mac, hostname, statements, content FROM dhcp_opts")
                .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|(name, ip, mac, hostname, statements, content)| DhcpBlob {
                    name,
                    ip,
                    mac,
                    hostname,
                    statements,
                    content,
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_networks(&self) -> Result<Vec<Network>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Network>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, String, String, Option<String>, String, String, Option<String>, Option<String>, String)> = conn
                .query(
                    "SELECT id, name, subnet, netmask, gateway, nameservers, ntpservers, \
                     domain, dynamic_range, extra FROM networks",
                )
                .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|(id, name, subnet, netmask, gateway, nameservers, ntpservers, domain, dynamic_range, extra)| {
                    let mut network = Network::new(name, subnet, netmask);
                    network.id = Some(id);
                    network.gateway = gateway;
                    network.nameservers = serde_json::from_str(&nameservers).unwrap_or_default();
                    network.ntpservers = serde_json::from_str(&ntpservers).unwrap_or_default();
                    network.domain = domain;
                    network.dynamic_range = dynamic_range;
                    network.extra = serde_json::from_str(&extra).unwrap_or(serde_json::Value::Null);
                    network.clear_changed();
                    network
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn get_network_by_name(&self, name: &str) -> Result<Option<Network>> {
        let pool = self.pool.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Network>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let row: Option<(u64, String, String, String, Option<String>, String, String, Option<String>, Option<String>, String)> = conn
                .exec_first(
                    "SELECT id, name, subnet, netmask, gateway, nameservers, ntpservers, domain, \
                     dynamic_range, extra FROM networks WHERE name = :name",
                    params! { "name" => &name },
                )
                .map_err(db_err)?;
            Ok(row.map(|(id, name, subnet, netmask, gateway, nameservers, ntpservers, domain, dynamic_range, extra)| {
                let mut network = Network::new(name, subnet, netmask);
                network.id = Some(id);
                network.gateway = gateway;
                network.nameservers = serde_json::from_str(&nameservers).unwrap_or_default();
                network.ntpservers = serde_json::from_str(&ntpservers).unwrap_or_default();
                network.domain = domain;
                network.dynamic_range = dynamic_range;
                network.extra = serde_json::from_str(&extra).unwrap_or(serde_json::Value::Null);
                network.clear_changed();
                network
            }))
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_network(&self, name: &str) -> Result<()> {
        let pool = self.pool.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.exec_drop("DELETE FROM networks WHERE name = :name", params! { "name" => &name }).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_network(&self, network: Network) -> Result<Network> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Network> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut network = network;
            if let Some(id) = network.id {
                conn.exec_drop(
                    "UPDATE networks SET subnet = :subnet, netmask = :netmask, gateway = :gateway, \
                     nameservers = :nameservers, ntpservers = :ntpservers, domain = :domain, \
                     dynamic_range = :dynamic_range, extra = :extra WHERE id = :id",
                    params! {
                        "subnet" => &network.subnet,
                        "netmask" => &network.netmask,
                        "gateway" => &network.gateway,
                        "nameservers" => serde_json::to_string(&network.nameservers).unwrap(),
                        "ntpservers" => serde_json::to_string(&network.ntpservers).unwrap(),
                        "domain" => &network.domain,
                        "dynamic_range" => &network.dynamic_range,
                        "extra" => network.extra.to_string(),
                        "id" => id,
                    },
                )
                .map_err(db_err)?;
            } else {
                conn.exec_drop(
                    "INSERT INTO networks (name, subnet, netmask, gateway, nameservers, \
                     ntpservers, domain, dynamic_range, extra) VALUES (:name, :subnet, :netmask, \
                     :gateway, :nameservers, :ntpservers, :domain, :dynamic_range, :extra)",
                    params! {
                        "name" => &network.name,
                        "subnet" => &network.subnet,
                        "netmask" => &network.netmask,
                        "gateway" => &network.gateway,
                        "nameservers" => serde_json::to_string(&network.nameservers).unwrap(),
                        "ntpservers" => serde_json::to_string(&network.ntpservers).unwrap(),
                        "domain" => &network.domain,
                        "dynamic_range" => &network.dynamic_range,
                        "extra" => network.extra.to_string(),
                    },
                )
                .map_err(db_err)?;
                network.set_id(conn.last_insert_id());
            }
            Ok(network)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn get_osimage(&self, id: u64) -> Result<Option<OsImage>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<OsImage>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            fetch_osimage(&mut conn, "id = :v", id)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn find_osimage_by_name(&self, name: &str) -> Result<Option<OsImage>> {
        let pool = self.pool.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<OsImage>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            fetch_osimage(&mut conn, "name = :v", name)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_osimages(&self) -> Result<Vec<OsImage>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<OsImage>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, String, String, String, Option<String>, Option<String>, Option<String>, Option<String>, String)> = conn
                .query(
                    "SELECT id, name, distro, ver, arch, profile, image_type, provmethod, \
                     rootfstype, orig_name FROM osimages",
                )
                .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|(id, name, distro, ver, arch, profile, image_type, provmethod, rootfstype, orig_name)| {
                    let mut img = OsImage::new(name, distro, ver, arch, orig_name);
                    img.id = Some(id);
                    img.profile = profile;
                    img.image_type = image_type;
                    img.provmethod = provmethod;
                    img.rootfstype = rootfstype;
                    img.clear_changed();
                    img
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_osimage(&self, image: OsImage) -> Result<OsImage> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<OsImage> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut image = image;
            conn.exec_drop(
                "INSERT INTO osimages (name, distro, ver, arch, profile, image_type, \
                 provmethod, rootfstype, orig_name) VALUES (:name, :distro, :ver, :arch, \
                 :profile, :image_type, :provmethod, :rootfstype, :orig_name)",
                params! {
                    "name" => &image.name,
                    "distro" => &image.distro,
                    "ver" => &image.ver,
                    "arch" => &image.arch,
                    "profile" => &image.profile,
                    "image_type" => &image.image_type,
                    "provmethod" => &image.provmethod,
                    "rootfstype" => &image.rootfstype,
                    "orig_name" => &image.orig_name,
                },
            )
            .map_err(db_err)?;
            image.set_id(conn.last_insert_id());
            Ok(image)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_osimage(&self, name: &str) -> Result<()> {
        let pool = self.pool.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.exec_drop("DELETE FROM osimages WHERE name = :name", params! { "name" => &name }).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn count_nodes_with_osimage(&self, id: u64) -> Result<u64> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let count: Option<u64> = conn
                .exec_first("SELECT COUNT(*) FROM nodes WHERE osimage_id = :id", params! { "id" => id })
                .map_err(db_err)?;
            Ok(count.unwrap_or(0))
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn get_passwd(&self, key: &str) -> Result<Option<Passwd>> {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Passwd>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let row: Option<(u64, String, String, String)> = conn
                .exec_first(
                    "SELECT id, `key`, username, password FROM passwds WHERE `key` = :key",
                    params! { "key" => &key },
                )
                .map_err(db_err)?;
            Ok(row.map(|(id, key, username, password)| {
                let mut p = Passwd::new(key, username, password);
                p.id = Some(id);
                p
            }))
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn list_passwds(&self) -> Result<Vec<Passwd>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Passwd>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, String, String)> = conn
                .query("SELECT id, `key`, username, password FROM passwds")
                .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|(id, key, username, password)| {
                    let mut p = Passwd::new(key, username, password);
                    p.id = Some(id);
                    p
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn destroy_passwd(&self, key: &str) -> Result<()> {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            conn.exec_drop("DELETE FROM passwds WHERE `key` = :key", params! { "key" => &key }).map_err(db_err)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn save_passwd(&self, passwd: Passwd) -> Result<Passwd> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Passwd> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let mut passwd = passwd;
            conn.exec_drop(
                "INSERT INTO passwds (`key`, username, password) VALUES (:key, :username, :password) \
                 ON DUPLICATE KEY UPDATE username = :username, password = :password",
                params! {
                    "key" => &passwd.key,
                    "username" => &passwd.username,
                    "password" => &passwd.password,
                },
            )
            .map_err(db_err)?;
            if passwd.id.is_none() {
                passwd.set_id(conn.last_insert_id());
            }
            Ok(passwd)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn register_service(&self, service: Service) -> Result<Service> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Service> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let already: Option<u64> = conn
                .exec_first(
                    "SELECT id FROM services WHERE hostname = :h AND kind = :k AND online = 1",
                    params! { "h" => &service.hostname, "k" => service.kind.as_wire() },
                )
                .map_err(db_err)?;
            if already.is_some() {
                return Err(Error::ServiceAlreadyRegistered(service.hostname));
            }
            let mut service = service;
            conn.exec_drop(
                "INSERT INTO services (hostname, kind, workers, online, updated_at) \
                 VALUES (:hostname, :kind, :workers, :online, :updated_at)",
                params! {
                    "hostname" => &service.hostname,
                    "kind" => service.kind.as_wire(),
                    "workers" => service.workers,
                    "online" => service.online,
                    "updated_at" => service.updated_at.naive_utc(),
                },
            )
            .map_err(db_err)?;
            service.set_id(conn.last_insert_id());
            Ok(service)
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn heartbeat(&self, hostname: &str, kind: ServiceKind) -> Result<()> {
        let pool = self.pool.clone();
        let hostname = hostname.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let now = Utc::now().naive_utc();
            let affected = conn
                .exec_iter(
                    "UPDATE services SET updated_at = :now, online = 1 WHERE hostname = :h AND kind = :k",
                    params! { "now" => now, "h" => &hostname, "k" => kind.as_wire() },
                )
                .map_err(db_err)?
                .affected_rows();
            if affected == 0 {
                return Err(Error::not_found(NotFoundKind::Service(hostname)));
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn live_services(&self, kind: ServiceKind, heartbeat_timeout_secs: i64) -> Result<Vec<Service>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Service>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let rows: Vec<(u64, String, u32, bool, chrono::NaiveDateTime)> = conn
                .exec(
                    "SELECT id, hostname, workers, online, updated_at FROM services WHERE kind = :k AND online = 1",
                    params! { "k" => kind.as_wire() },
                )
                .map_err(db_err)?;
            let now = Utc::now();
            Ok(rows
                .into_iter()
                .filter_map(|(id, hostname, workers, online, updated_at)| {
                    let mut svc = Service::new(hostname, kind, workers);
                    svc.id = Some(id);
                    svc.online = online;
                    svc.updated_at = chrono::DateTime::from_naive_utc_and_offset(updated_at, Utc);
                    svc.clear_changed();
                    if svc.is_live(now, heartbeat_timeout_secs) {
                        Some(svc)
                    } else {
                        None
                    }
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }

    async fn find_service_by_id(&self, id: u64) -> Result<Option<Service>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Service>> {
            let mut conn = pool.get_conn().map_err(db_err)?;
            let row: Option<(String, String, u32, bool, chrono::NaiveDateTime)> = conn
                .exec_first(
                    "SELECT hostname, kind, workers, online, updated_at FROM services WHERE id = :id",
                    params! { "id" => id },
                )
                .map_err(db_err)?;
            Ok(row.map(|(hostname, kind, workers, online, updated_at)| {
                let kind = if kind == "network" { ServiceKind::Network } else { ServiceKind::Conductor };
                let mut svc = Service::new(hostname, kind, workers);
                svc.id = Some(id);
                svc.online = online;
                svc.updated_at = chrono::DateTime::from_naive_utc_and_offset(updated_at, Utc);
                svc.clear_changed();
                svc
            }))
        })
        .await
        .map_err(|e| Error::Unclassified(e.to_string()))?
    }
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

fn insert_one_node(conn: &mut mysql::PooledConn, node: &Node) -> Result<()> {
    let existing: Option<u64> = conn
        .exec_first("SELECT id FROM nodes WHERE name = :name", params! { "name" => &node.name })
        .map_err(db_err)?;
    if existing.is_some() {
        return Err(Error::conflict(ConflictKind::DuplicateName("duplicate name".to_string())));
    }
    insert_node_row(conn, node)
}

fn insert_one_node_tx(tx: &mut mysql::Transaction, node: &Node) -> Result<()> {
    insert_node_row(tx, node)
}

fn insert_node_row<C: Queryable>(conn: &mut C, node: &Node) -> Result<()> {
    conn.exec_drop(
        "INSERT INTO nodes (name, mgt, netboot, arch, node_type, state, task_action, \
         control_info, console_info, reservation, conductor_affinity, osimage_id, passwd_id) \
         VALUES (:name, :mgt, :netboot, :arch, :node_type, :state, :task_action, :control_info, \
         :console_info, :reservation, :conductor_affinity, :osimage_id, :passwd_id)",
        params! {
            "name" => &node.name,
            "mgt" => &node.mgt,
            "netboot" => &node.netboot,
            "arch" => &node.arch,
            "node_type" => &node.node_type,
            "state" => provision_state_to_db(node.state),
            "task_action" => &node.task_action,
            "control_info" => serde_json::to_string(&node.control_info).unwrap_or_default(),
            "console_info" => node.console_info.as_ref().map(|v| v.to_string()),
            "reservation" => &node.reservation,
            "conductor_affinity" => node.conductor_affinity,
            "osimage_id" => node.osimage_id,
            "passwd_id" => node.passwd_id,
        },
    )
    .map_err(db_err)?;
    for nic in &node.nics {
        conn.exec_drop(
            "INSERT INTO nics (uuid, mac, name, ip, netmask, node_id, `primary`, extra) \
             SELECT :uuid, :mac, :name, :ip, :netmask, id, :primary, :extra FROM nodes WHERE name = :node_name",
            params! {
                "uuid" => &nic.uuid,
                "mac" => &nic.mac,
                "name" => &nic.name,
                "ip" => &nic.ip,
                "netmask" => &nic.netmask,
                "node_name" => &node.name,
                "primary" => nic.primary,
                "extra" => nic.extra.to_string(),
            },
        )
        .map_err(db_err)?;
    }
    Ok(())
}

type NicRow = (u64, String, String, Option<String>, Option<String>, Option<String>, Option<u64>, bool, String);

fn nic_from_row((id, uuid, mac, name, ip, netmask, node_id, primary, extra): NicRow) -> Nic {
    let mut nic = Nic::new(mac);
    nic.id = Some(id);
    nic.uuid = uuid;
    nic.name = name;
    nic.ip = ip;
    nic.netmask = netmask;
    nic.node_id = node_id;
    nic.primary = primary;
    nic.extra = serde_json::from_str(&extra).unwrap_or(serde_json::Value::Null);
    nic.clear_changed();
    nic
}

fn fetch_osimage<V: Into<mysql::Value>>(
    conn: &mut mysql::PooledConn,
    clause: &str,
    value: V,
) -> Result<Option<OsImage>> {
    let row: Option<(u64, String, String, String, String, Option<String>, Option<String>, Option<String>, Option<String>, String)> =
        conn.exec_first(
            format!(
                "SELECT id, name, distro, ver, arch, profile, image_type, provmethod, rootfstype, \
                 orig_name FROM osimages WHERE {clause}"
            ),
            params! { "v" => value },
        )
        .map_err(db_err)?;
    Ok(row.map(|(id, name, distro, ver, arch, profile, image_type, provmethod, rootfstype, orig_name)| {
        let mut img = OsImage::new(name, distro, ver, arch, orig_name);
        img.id = Some(id);
        img.profile = profile;
        img.image_type = image_type;
        img.provmethod = provmethod;
        img.rootfstype = rootfstype;
        img.clear_changed();
        img
    }))
}
