//! OpenBMC REST control plugin: login, read and set power state
//! against `/xyz/openbmc_project/state/host0` using `reqwest` (already
//! in the workspace stack for `xcat3-rpc`).

use super::ControlPlugin;
use async_trait::async_trait;
use serde_json::json;
use xcat3_common::states::{BootDevice, PowerState, PowerTarget};
use xcat3_common::{Error, Result};
use xcat3_db::{ControlInfo, Node};

const POWER_STATE_PATH: &str = "/xyz/openbmc_project/state/host0";
const TRANSITION_PATH: &str = "/xyz/openbmc_project/state/host0/attr/RequestedHostTransition";
const BOOT_SOURCE_PATH: &str = "/xyz/openbmc_project/control/host0/boot/attr/BootSource";

pub struct OpenbmcControl {
    client: reqwest::Client,
}

impl OpenbmcControl {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .expect("reqwest client builds with default TLS config"),
        }
    }

    fn fields(node: &Node) -> Result<(&str, &str, &str)> {
        match &node.control_info {
            ControlInfo::Openbmc { rest_address, rest_username, rest_password } => {
                Ok((rest_address, rest_username, rest_password))
            }
            _ => Err(Error::InvalidParameterValue(format!(
                "node {} has mgt=openbmc but no openbmc control_info",
                node.name
            ))),
        }
    }

    async fn login(&self, address: &str, username: &str, password: &str) -> Result<()> {
        let url = format!("https://{address}/login");
        self.client
            .post(&url)
            .json(&json!({ "data": [username, password] }))
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc login failed: {e}")))?;
        Ok(())
    }

    fn map_transition(state: &str) -> PowerState {
        if state.ends_with("HostState.Off") {
            PowerState::Off
        } else if state.ends_with("HostState.Running") {
            PowerState::On
        } else {
            PowerState::Error
        }
    }

    fn map_boot_source(source: &str) -> BootDevice {
        if source.ends_with("Sources.Network") {
            BootDevice::Net
        } else if source.ends_with("Sources.Disk") {
            BootDevice::Disk
        } else if source.ends_with("Sources.ExternalMedia") || source.ends_with("Sources.Cd") {
            BootDevice::Cdrom
        } else {
            BootDevice::Unknown
        }
    }

    fn boot_source_transition(device: BootDevice) -> &'static str {
        match device {
            BootDevice::Net => "xyz.openbmc_project.Control.Boot.Source.Sources.Network",
            BootDevice::Disk => "xyz.openbmc_project.Control.Boot.Source.Sources.Disk",
            BootDevice::Cdrom => "xyz.openbmc_project.Control.Boot.Source.Sources.ExternalMedia",
            BootDevice::Unknown => "xyz.openbmc_project.Control.Boot.Source.Sources.Default",
        }
    }
}

impl Default for OpenbmcControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlugin for OpenbmcControl {
    fn validate(&self, node: &Node) -> Result<()> {
        let (address, username, password) = Self::fields(node)?;
        if address.is_empty() {
            return Err(Error::MissingParameterValue("rest_address was not specified".to_string()));
        }
        if username.is_empty() {
            return Err(Error::MissingParameterValue("rest_username was not specified".to_string()));
        }
        if password.is_empty() {
            return Err(Error::MissingParameterValue("rest_password was not specified".to_string()));
        }
        Ok(())
    }

    async fn get_power_state(&self, node: &Node) -> Result<PowerState> {
        let (address, username, password) = Self::fields(node)?;
        self.login(address, username, password).await?;
        let url = format!("https://{address}{POWER_STATE_PATH}");
        let resp: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc power state fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc power state decode failed: {e}")))?;
        let state = resp
            .pointer("/data/CurrentHostState")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        Ok(Self::map_transition(state))
    }

    async fn set_power_state(&self, node: &Node, target: PowerTarget) -> Result<()> {
        let (address, username, password) = Self::fields(node)?;
        self.login(address, username, password).await?;
        let transition = match target {
            PowerTarget::On => "xyz.openbmc_project.State.Host.Transition.On",
            PowerTarget::Off | PowerTarget::SoftOff => "xyz.openbmc_project.State.Host.Transition.Off",
            PowerTarget::Reboot | PowerTarget::SoftReboot => "xyz.openbmc_project.State.Host.Transition.Reboot",
        };
        let url = format!("https://{address}{TRANSITION_PATH}");
        self.client
            .put(&url)
            .json(&json!({ "data": transition }))
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc power transition failed: {e}")))?;
        Ok(())
    }

    async fn reboot(&self, node: &Node) -> Result<()> {
        self.set_power_state(node, PowerTarget::Reboot).await
    }

    async fn get_boot_device(&self, node: &Node) -> Result<BootDevice> {
        let (address, username, password) = Self::fields(node)?;
        self.login(address, username, password).await?;
        let url = format!("https://{address}{BOOT_SOURCE_PATH}");
        let resp: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc boot source fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc boot source decode failed: {e}")))?;
        let source = resp.pointer("/data").and_then(|v| v.as_str()).unwrap_or("");
        Ok(Self::map_boot_source(source))
    }

    async fn set_boot_device(&self, node: &Node, device: BootDevice) -> Result<()> {
        let (address, username, password) = Self::fields(node)?;
        self.login(address, username, password).await?;
        let url = format!("https://{address}{BOOT_SOURCE_PATH}");
        self.client
            .put(&url)
            .json(&json!({ "data": Self::boot_source_transition(device) }))
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("openbmc boot source set failed: {e}")))?;
        Ok(())
    }
}
