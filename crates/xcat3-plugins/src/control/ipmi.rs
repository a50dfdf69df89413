//! Stub IPMI control plugin. Implementing the raw IPMI wire protocol is
//! explicitly out of scope (§4.3 Non-goals), so this plugin validates
//! `control_info` and reports success without touching any BMC.

use super::ControlPlugin;
use async_trait::async_trait;
use xcat3_common::states::{BootDevice, PowerState, PowerTarget};
use xcat3_common::{Error, Result};
use xcat3_db::{ControlInfo, Node};

pub struct IpmiControl;

impl IpmiControl {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IpmiControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlugin for IpmiControl {
    fn validate(&self, node: &Node) -> Result<()> {
        match &node.control_info {
            ControlInfo::Ipmi { bmc_address, bmc_username, bmc_password } => {
                if bmc_address.is_empty() {
                    return Err(Error::MissingParameterValue("bmc_address was not specified".to_string()));
                }
                if bmc_username.is_empty() {
                    return Err(Error::MissingParameterValue("bmc_username was not specified".to_string()));
                }
                if bmc_password.is_empty() {
                    return Err(Error::MissingParameterValue("bmc_password was not specified".to_string()));
                }
                Ok(())
            }
            _ => Err(Error::InvalidParameterValue(format!(
                "node {} has mgt=ipmi but no ipmi control_info",
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
