//! The Node entity (§3).

use crate::nic::Nic;
use crate::record::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_common::states::ProvisionState;
use xcat3_macros::Record;

/// §9: `control_info` as a discriminated union keyed on `mgt`, rather
/// than the untyped mapping the source uses. `Unknown` is the fallback
/// for an `mgt` key this crate doesn't have a typed variant for yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mgt", rename_all = "snake_case")]
pub enum ControlInfo {
    Ipmi {
        bmc_address: String,
        bmc_username: String,
        bmc_password: String,
    },
    Kvm {
        ssh_address: String,
        ssh_username: String,
        ssh_key_filename: String,
        ssh_virt_type: String,
    },
    Openbmc {
        rest_address: String,
        rest_username: String,
        rest_password: String,
    },
    Unknown(serde_json::Value),
}

impl ControlInfo {
    pub fn mgt(&self) -> &'static str {
        match self {
            ControlInfo::Ipmi { .. } => "ipmi",
            ControlInfo::Kvm { .. } => "kvm",
            ControlInfo::Openbmc { .. } => "openbmc",
            ControlInfo::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, Record)]
pub struct Node {
    pub id: Option<u64>,
    pub name: String,
    pub mgt: String,
    pub netboot: String,
    pub arch: String,
    pub node_type: String,
    pub state: ProvisionState,
    pub task_action: Option<String>,
    pub control_info: ControlInfo,
    pub console_info: Option<serde_json::Value>,
    pub reservation: Option<String>,
    pub conductor_affinity: Option<u64>,
    pub osimage_id: Option<u64>,
    pub passwd_id: Option<u64>,
    /// Set by the task manager's async release path (§4.4) when a
    /// spawned worker fails; never overwritten once set until the next
    /// successful operation clears it explicitly.
    pub last_error: Option<String>,
    /// Populated in-memory by `list_in(.., want_nics=true)`; not a DB
    /// column on `nodes` itself.
    pub nics: Vec<Nic>,
    pub changed: HashSet<&'static str>,
}

impl Node {
    pub fn new(name: impl Into<String>, mgt: impl Into<String>, netboot: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            mgt: mgt.into(),
            netboot: netboot.into(),
            arch: String::new(),
            node_type: String::new(),
            state: ProvisionState::Undeployed,
            task_action: None,
            control_info: ControlInfo::Unknown(serde_json::Value::Null),
            console_info: None,
            reservation: None,
            conductor_affinity: None,
            osimage_id: None,
            passwd_id: None,
            last_error: None,
            nics: Vec::new(),
            changed: HashSet::new(),
        }
    }

    /// Is this node free to be reserved/destroyed?
    pub fn is_free(&self) -> bool {
        self.reservation.is_none()
    }

    /// §9 resolved ambiguity: destroying a node in `DEPLOY_NODESET` is
    /// refused (the later, safer of the two source policies).
    pub fn may_be_destroyed(&self) -> bool {
        self.state != ProvisionState::DeployNodeset
    }

    /// §9 resolved ambiguity: if no nic is marked `primary`, fall back
    /// to the first nic with a non-null ip/mac. `extra.primary` is
    /// treated as a legacy alias, never authoritative.
    pub fn primary_nic(&self) -> Option<&Nic> {
        self.nics
            .iter()
            .find(|n| n.effective_primary())
            .or_else(|| self.nics.iter().find(|n| n.ip.is_some() || !n.mac.is_empty()))
    }
}

impl Entity for Node {
    fn table_name() -> &'static str {
        "nodes"
    }

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nic::Nic;

    #[test]
    fn primary_nic_falls_back_to_first_nic_with_ip_or_mac() {
        let mut node = Node::new("n1", "ipmi", "pxe");
        let mut n1 = Nic::new("00:11:22:33:44:55");
        n1.primary = false;
        n1.ip = Some("10.0.0.1".to_string());
        node.nics.push(n1);
        assert!(node.primary_nic().is_some());
        assert_eq!(node.primary_nic().unwrap().ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn primary_flag_wins_over_fallback() {
        let mut node = Node::new("n1", "ipmi", "pxe");
        let mut other = Nic::new("aa:bb:cc:dd:ee:ff");
        other.ip = Some("10.0.0.2".to_string());
        node.nics.push(other);
        let mut primary = Nic::new("00:11:22:33:44:55");
        primary.primary = true;
        primary.ip = Some("10.0.0.1".to_string());
        node.nics.push(primary);
        assert_eq!(node.primary_nic().unwrap().ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn deploy_nodeset_nodes_refuse_destroy() {
        let mut node = Node::new("n1", "ipmi", "pxe");
        node.state = ProvisionState::DeployNodeset;
        assert!(!node.may_be_destroyed());
        node.state = ProvisionState::DeployDone;
        assert!(node.may_be_destroyed());
    }

    #[test]
    fn set_name_records_change() {
        let mut node = Node::new("n1", "ipmi", "pxe");
        node.clear_changed();
        node.set_arch("ppc64le".to_string());
        assert!(node.changed_fields().contains("arch"));
    }
}
