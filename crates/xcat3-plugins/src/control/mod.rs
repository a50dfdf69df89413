//! The control plugin kind (§4.3): power management actions against a
//! node's management controller.

mod ipmi;
mod kvm;
mod openbmc;

pub use ipmi::IpmiControl;
pub use kvm::KvmControl;
pub use openbmc::OpenbmcControl;

use async_trait::async_trait;
use xcat3_common::states::{BootDevice, PowerState};
use xcat3_db::Node;
use xcat3_common::Result;

#[async_trait]
pub trait ControlPlugin: Send + Sync {
    /// Validate the node's `control_info` carries what this plugin
    /// needs (§4.3); executed synchronously on the API request path, so
    /// it must not perform long-running I/O.
    fn validate(&self, node: &Node) -> Result<()>;

    async fn get_power_state(&self, node: &Node) -> Result<PowerState>;

    async fn set_power_state(&self, node: &Node, target: xcat3_common::states::PowerTarget) -> Result<()>;

    async fn reboot(&self, node: &Node) -> Result<()>;

    async fn get_boot_device(&self, node: &Node) -> Result<BootDevice>;

    async fn set_boot_device(&self, node: &Node, device: BootDevice) -> Result<()>;

    /// Optional hardware inventory fetch; most plugins don't implement
    /// this (§4.3, grounded on `ControlInterface.get_inventory`'s
    /// non-abstract default).
    async fn get_inventory(&self, _node: &Node) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}
