//! Enumerations shared across the store, plugins and pipeline: the
//! provision state machine (§4.7), power/boot-device vocabularies
//! (§4.3), and the service kinds (§3/§4.4).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Node provision state. `None` is named `Undeployed` here to avoid
/// colliding with `std::option::Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisionState {
    Undeployed,
    DeployDhcp,
    DeployNodeset,
    DeployDone,
}

impl ProvisionState {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ProvisionState::Undeployed => "none",
            ProvisionState::DeployDhcp => "deploy_dhcp",
            ProvisionState::DeployNodeset => "deploy_nodeset",
            ProvisionState::DeployDone => "deploy_done",
        }
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// `target` values accepted by `PUT /v1/nodes/provision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionTarget {
    Dhcp,
    Nodeset,
    UnDhcp,
    UnNodeset,
}

impl ProvisionTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dhcp" => Some(ProvisionTarget::Dhcp),
            "nodeset" => Some(ProvisionTarget::Nodeset),
            "un_dhcp" => Some(ProvisionTarget::UnDhcp),
            "un_nodeset" => Some(ProvisionTarget::UnNodeset),
            _ => None,
        }
    }

    /// `target.startswith('un_')` in the original.
    pub fn is_undo(&self) -> bool {
        matches!(self, ProvisionTarget::UnDhcp | ProvisionTarget::UnNodeset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTarget {
    On,
    Off,
    Reboot,
    SoftReboot,
    SoftOff,
}

impl PowerTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on" => Some(PowerTarget::On),
            "off" => Some(PowerTarget::Off),
            "reboot" => Some(PowerTarget::Reboot),
            "soft_reboot" => Some(PowerTarget::SoftReboot),
            "soft_off" => Some(PowerTarget::SoftOff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    Net,
    Disk,
    Cdrom,
    Unknown,
}

impl BootDevice {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "net" => Some(BootDevice::Net),
            "disk" => Some(BootDevice::Disk),
            "cdrom" => Some(BootDevice::Cdrom),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            BootDevice::Net => "net",
            BootDevice::Disk => "disk",
            BootDevice::Cdrom => "cdrom",
            BootDevice::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Conductor,
    Network,
}

impl ServiceKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ServiceKind::Conductor => "conductor",
            ServiceKind::Network => "network",
        }
    }

    /// RPC topic base, e.g. `xcat3.conductor_manager`.
    pub fn topic_base(&self) -> &'static str {
        match self {
            ServiceKind::Conductor => "xcat3.conductor_manager",
            ServiceKind::Network => "xcat3.network_manager",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_target_recognizes_undo_prefix() {
        assert!(ProvisionTarget::parse("un_dhcp").unwrap().is_undo());
        assert!(!ProvisionTarget::parse("nodeset").unwrap().is_undo());
        assert!(ProvisionTarget::parse("bogus").is_none());
    }

    #[test]
    fn topic_base_matches_original_names() {
        assert_eq!(ServiceKind::Conductor.topic_base(), "xcat3.conductor_manager");
        assert_eq!(ServiceKind::Network.topic_base(), "xcat3.network_manager");
    }
}
