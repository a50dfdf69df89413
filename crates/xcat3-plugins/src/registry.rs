//! The process-wide plugin table (§4.3): built once at startup (here,
//! once per `PluginRegistry::new()` call — every worker binary
//! constructs exactly one and hands out shared references), keyed by
//! `node.mgt`/`node.netboot`/osimage distro, raising `PluginNotFound`
//! on a missing key.

use crate::boot::{BootPlugin, PetitbootBoot, PxeBoot};
use crate::control::{ControlPlugin, IpmiControl, KvmControl, OpenbmcControl};
use crate::os::{GenericOsPlugin, OsPlugin, RedhatOsPlugin, UbuntuOsPlugin};
use std::collections::HashMap;
use xcat3_common::error::NotFoundKind;
use xcat3_common::{Error, Result};
use xcat3_db::{Node, OsImage};

pub struct PluginRegistry {
    control: HashMap<&'static str, Box<dyn ControlPlugin>>,
    boot: HashMap<&'static str, Box<dyn BootPlugin>>,
    os: HashMap<&'static str, Box<dyn OsPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        let mut control: HashMap<&'static str, Box<dyn ControlPlugin>> = HashMap::new();
        control.insert("ipmi", Box::new(IpmiControl::new()));
        control.insert("kvm", Box::new(KvmControl::new()));
        control.insert("openbmc", Box::new(OpenbmcControl::new()));

        let mut boot: HashMap<&'static str, Box<dyn BootPlugin>> = HashMap::new();
        boot.insert("pxe", Box::new(PxeBoot::new()));
        boot.insert("petitboot", Box::new(PetitbootBoot::new()));

        let mut os: HashMap<&'static str, Box<dyn OsPlugin>> = HashMap::new();
        os.insert("ubuntu", Box::new(UbuntuOsPlugin::new()));
        os.insert("redhat", Box::new(RedhatOsPlugin::new()));
        os.insert("generic", Box::new(GenericOsPlugin::new()));

        Self { control, boot, os }
    }

    pub fn get_control_plugin(&self, node: &Node) -> Result<&dyn ControlPlugin> {
        self.control
            .get(node.mgt.as_str())
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::not_found(NotFoundKind::Plugin(node.mgt.clone())))
    }

    pub fn get_boot_plugin(&self, node: &Node) -> Result<&dyn BootPlugin> {
        self.boot
            .get(node.netboot.as_str())
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::not_found(NotFoundKind::Plugin(node.netboot.clone())))
    }

    /// §9 resolved ambiguity: the source's `os_dict` maps only
    /// `'Ubuntu-Server' -> 'ubuntu'` and leaves every other distro
    /// unmapped, which would make `get_osimage_plugin` raise for any
    /// RHEL/CentOS image despite `RedhatInterface` existing. Here any
    /// distro containing "ubuntu" routes to `UbuntuOsPlugin`, any
    /// containing "rhel"/"redhat"/"centos" routes to `RedhatOsPlugin`,
    /// and everything else falls back to `GenericOsPlugin` rather than
    /// `PluginNotFound` — a generic controller should provision an
    /// arbitrary, conventionally-laid-out distro tree.
    pub fn get_osimage_plugin(&self, osimage: &OsImage) -> Result<&dyn OsPlugin> {
        let distro = osimage.distro.to_ascii_lowercase();
        let key = if distro.contains("ubuntu") {
            "ubuntu"
        } else if distro.contains("rhel") || distro.contains("redhat") || distro.contains("centos") {
            "redhat"
        } else {
            "generic"
        };
        self.os
            .get(key)
            .map(|b| b.as_ref())
            .ok_or_else(|| Error::not_found(NotFoundKind::Plugin(osimage.distro.clone())))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcat3_db::Node;

    #[test]
    fn unknown_mgt_reports_plugin_not_found() {
        let registry = PluginRegistry::new();
        let node = Node::new("n1", "unknown-mgt", "pxe");
        let err = registry.get_control_plugin(&node).unwrap_err();
        assert_eq!(err, Error::not_found(NotFoundKind::Plugin("unknown-mgt".to_string())));
    }

    #[test]
    fn redhat_like_distros_route_to_redhat_plugin() {
        let registry = PluginRegistry::new();
        let osimage = OsImage::new("centos-7.3-x86_64", "centos", "7.3", "x86_64", "centos-7.3.iso");
        assert!(registry.get_osimage_plugin(&osimage).is_ok());
    }
}
