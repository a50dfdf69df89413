//! Petitboot boot plugin: unlike PXE it serves its config over HTTP
//! (option 209 carries the config URL directly, no per-mac symlink
//! scheme) and writes `#boot` as its disk-boot fallback marker.

use super::{BootContext, BootPlugin};
use crate::DhcpOpts;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use xcat3_common::error::NotFoundKind;
use xcat3_common::{Error, Result};
use xcat3_db::{Node, OsImage};

const TRY_DISK_BOOT_STR: &str = "#boot";

pub struct PetitbootBoot;

impl PetitbootBoot {
    pub fn new() -> Self {
        Self
    }

    fn config_dir(ctx: &BootContext) -> PathBuf {
        Path::new(&ctx.install_dir).join("boot")
    }

    fn config_path(ctx: &BootContext, node: &Node) -> PathBuf {
        Self::config_dir(ctx).join(&node.name)
    }

    fn config_url(ctx: &BootContext, node: &Node) -> String {
        format!("http://{}/install/boot/{}", ctx.host_ip, node.name)
    }
}

impl Default for PetitbootBoot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BootPlugin for PetitbootBoot {
    fn validate(&self, node: &Node) -> Result<()> {
        node.primary_nic()
            .map(|_| ())
            .ok_or_else(|| Error::MissingParameterValue(format!("node {} has no primary nic", node.name)))
    }

    fn gen_dhcp_opts(&self, node: &Node, ctx: &BootContext) -> Result<DhcpOpts> {
        let mac = node
            .primary_nic()
            .map(|n| n.mac.clone())
            .ok_or_else(|| Error::MissingParameterValue(format!("node {} has no primary nic", node.name)))?;
        let ip = node.primary_nic().and_then(|n| n.ip.clone());
        let mut opts = DhcpOpts::new(mac, ip, node.name.clone(), ctx.host_ip.clone());
        opts.petitboot_config_url = Some(Self::config_url(ctx, node));
        Ok(opts)
    }

    async fn build_boot_conf(&self, node: &Node, os_boot_str: &str, osimage: &OsImage, ctx: &BootContext) -> Result<()> {
        let osimage_path = osimage.tree_path(&ctx.install_dir).join("xcat");
        let kernel = osimage_path.join("vmlinuz");
        if !kernel.exists() {
            return Err(Error::not_found(NotFoundKind::File(kernel.display().to_string())));
        }
        let initrd = osimage_path.join("initrd.img");
        if !initrd.exists() {
            return Err(Error::not_found(NotFoundKind::File(initrd.display().to_string())));
        }

        let mirror = format!("{}{}/{}", osimage.distro, osimage.ver, osimage.arch);
        let base_url = format!("http://{}/install/{}", ctx.host_ip, mirror);
        let kernel_url = format!("{base_url}/xcat/vmlinuz");
        let initrd_url = format!("{base_url}/xcat/initrd.img");

        let config_path = Self::config_path(ctx, node);
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Unclassified(format!("failed to create {}: {e}", parent.display())))?;
        }
        let config = format!(
            "kernel={kernel_url}\ninitrd={initrd_url}\nargs={os_boot_str}\nhost_ip={}\nnode={}\n",
            ctx.host_ip, node.name
        );
        tokio::fs::write(&config_path, config)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to write {}: {e}", config_path.display())))?;
        Ok(())
    }

    async fn continue_deploy(&self, node: &Node, ctx: &BootContext) -> Result<()> {
        let config_path = Self::config_path(ctx, node);
        tokio::fs::write(&config_path, TRY_DISK_BOOT_STR)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to write {}: {e}", config_path.display())))?;
        Ok(())
    }

    async fn clean(&self, node: &Node, ctx: &BootContext) -> Result<()> {
        let _ = tokio::fs::remove_file(Self::config_path(ctx, node)).await;
        Ok(())
    }
}
