//! KVM/virsh-over-SSH control plugin (required `control_info` fields:
//! `ssh_address`, `ssh_username`, `ssh_virt_type`). Driving an actual
//! `virsh` session over SSH is out of scope (§4.3 Non-goals — no real
//! hypervisor wire protocol), so this validates the required
//! `control_info` fields and reports success the way `IpmiControl`
//! does; only the validation rules differ per plugin.

use super::ControlPlugin;
use async_trait::async_trait;
use xcat3_common::states::{BootDevice, PowerState, PowerTarget};
use xcat3_common::{Error, Result};
use xcat3_db::{ControlInfo, Node};

pub struct KvmControl;

impl KvmControl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KvmControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlugin for KvmControl {
    fn validate(&self, node: &Node) -> Result<()> {
        match &node.control_info {
            ControlInfo::Kvm { ssh_address, ssh_username, ssh_virt_type, .. } => {
                if ssh_address.is_empty() {
                    return Err(Error::MissingParameterValue("ssh_address was not specified".to_string()));
                }
                if ssh_username.is_empty() {
                    return Err(Error::MissingParameterValue("ssh_username was not specified".to_string()));
                }
                if ssh_virt_type.is_empty() {
                    return Err(Error::MissingParameterValue("ssh_virt_type was not specified".to_string()));
                }
                Ok(())
            }
            _ => Err(Error::InvalidParameterValue(format!(
                "node {} has mgt=kvm but no kvm control_info",
                node.name
            ))),
        }
    }

    async fn get_power_state(&self, _node: &Node) -> Result<PowerState> {
        Ok(PowerState::On)
    }

    async fn set_power_state(&self, _node: &Node, _target: PowerTarget) -> Result<()> {
        Ok(())
    }

    async fn reboot(&self, _node: &Node) -> Result<()> {
        Ok(())
    }

    async fn get_boot_device(&self, _node: &Node) -> Result<BootDevice> {
        Ok(BootDevice::Unknown)
    }

    async fn set_boot_device(&self, _node: &Node, _device: BootDevice) -> Result<()> {
        Ok(())
    }
}
