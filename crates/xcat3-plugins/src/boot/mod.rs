//! The boot plugin kind (§4.3, §4.10): renders netboot configuration
//! (PXE config file / petitboot config) and the DHCP options a node
//! needs to reach it.

mod petitboot;
mod pxe;

pub use petitboot::PetitbootBoot;
pub use pxe::PxeBoot;

use crate::DhcpOpts;
use async_trait::async_trait;
use xcat3_common::Result;
use xcat3_db::{Node, OsImage};

/// Paths the boot plugin writes under; grounded on `PXEBoot.CONFIG_DIR`
/// / `Petitboot.CONFIG_DIR` being derived from `CONF.deploy.tftp_dir`
/// and `CONF.deploy.install_dir` respectively, plus the conductor's own
/// advertised IP (`CONF.conductor.host_ip`) used in option 66 and in
/// rendered URLs.
#[derive(Debug, Clone)]
pub struct BootContext {
    pub tftp_dir: String,
    pub install_dir: String,
    pub host_ip: String,
}

#[async_trait]
pub trait BootPlugin: Send + Sync {
    /// Validate the node carries what this plugin needs to render boot
    /// config and DHCP options (§4.3); run before `gen_dhcp_opts` in the
    /// provisioning pipeline (§4.7 step 4).
    fn validate(&self, node: &Node) -> Result<()>;

    /// §4.3: requires the node to carry a resolved primary mac/ip
    /// (`Node::primary_nic`); the boot plugin itself doesn't resolve
    /// these, the pipeline does before calling in (§4.7 step 4).
    fn gen_dhcp_opts(&self, node: &Node, ctx: &BootContext) -> Result<DhcpOpts>;

    /// Writes the node's boot config to disk, symlinking to the
    /// osimage's kernel/initrd under the TFTP root.
    async fn build_boot_conf(&self, node: &Node, os_boot_str: &str, osimage: &OsImage, ctx: &BootContext) -> Result<()>;

    /// Rewrites the boot config to fall through to local disk boot, in
    /// response to the provision callback (§4.7 step 7).
    async fn continue_deploy(&self, node: &Node, ctx: &BootContext) -> Result<()>;

    /// Removes the generated files for this node (§4.7 clean/undo
    /// path).
    async fn clean(&self, node: &Node, ctx: &BootContext) -> Result<()>;
}
