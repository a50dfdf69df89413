//! The OS plugin kind (§4.3): renders per-distro install configuration
//! (kickstart/preseed) and the kernel command-line string the boot
//! plugin stitches into its own config.

mod generic;
mod redhat;
mod ubuntu;

pub use generic::GenericOsPlugin;
pub use redhat::RedhatOsPlugin;
pub use ubuntu::UbuntuOsPlugin;

use async_trait::async_trait;
use xcat3_common::Result;
use xcat3_db::{Node, OsImage};

#[derive(Debug, Clone)]
pub struct OsContext {
    pub install_dir: String,
    pub host_ip: String,
    pub api_host_ip: String,
    pub api_port: u16,
}

#[async_trait]
pub trait OsPlugin: Send + Sync {
    /// Validate the node/osimage pair carries what this plugin needs to
    /// build an install string and render a template (§4.3); run before
    /// `build_os_boot_str` in the provisioning pipeline (§4.7 step 4).
    fn validate(&self, node: &Node, osimage: &OsImage) -> Result<()>;

    /// The kernel command-line fragment the boot plugin appends to its
    /// own boot entry (§4.7 step 4), e.g. `inst.ks=...` for Anaconda.
    fn build_os_boot_str(&self, node: &Node, osimage: &OsImage, ctx: &OsContext) -> Result<String>;

    /// Renders the per-node install script/template (kickstart/preseed)
    /// to the autoinst tree and links the post-install hook script.
    /// `password` is the already-crypted system password (§4.7 step 4,
    /// §4.8), `None` when no `Passwd` record applies.
    async fn render(&self, node: &Node, osimage: &OsImage, password: Option<&str>, ctx: &OsContext) -> Result<()>;

    /// Removes the rendered per-node artifacts.
    async fn clean(&self, node: &Node, ctx: &OsContext) -> Result<()>;
}
