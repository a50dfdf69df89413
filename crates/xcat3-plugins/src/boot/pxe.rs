//! PXE boot plugin: per-mac symlink into a per-node
//! `pxelinux.cfg/<name>/config` file, kernel/initrd symlinked from the
//! osimage's tftp tree, and the disk-boot fallback string written
//! verbatim on the provision callback.

use super::{BootContext, BootPlugin};
use crate::DhcpOpts;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use xcat3_common::error::NotFoundKind;
use xcat3_common::{Error, Result};
use xcat3_db::{Node, OsImage};

const TRY_DISK_BOOT_STR: &str = "DEFAULT xCAT\nLABEL xCAT\nLOCALBOOT 0\n";

pub struct PxeBoot;

impl PxeBoot {
    pub fn new() -> Self {
        Self
    }

    fn config_dir(ctx: &BootContext) -> PathBuf {
        Path::new(&ctx.tftp_dir).join("pxelinux.cfg")
    }

    fn config_path(ctx: &BootContext, node: &Node) -> PathBuf {
        Self::config_dir(ctx).join(&node.name).join("config")
    }

    fn mac_path(ctx: &BootContext, mac: &str) -> PathBuf {
        let mac_file_name = format!("01-{}", mac.replace(':', "-").to_ascii_lowercase());
        Self::config_dir(ctx).join(mac_file_name)
    }

    fn tftp_root_for_node(ctx: &BootContext, node: &Node) -> PathBuf {
        Path::new(&ctx.tftp_dir).join(&node.name)
    }

    fn primary_mac(node: &Node) -> Result<String> {
        node.primary_nic()
            .map(|n| n.mac.clone())
            .ok_or_else(|| Error::MissingParameterValue(format!(
                "node {} has no nic with a mac/ip associated with it",
                node.name
            )))
    }

    fn primary_ip(node: &Node) -> Result<String> {
        node.primary_nic()
            .and_then(|n| n.ip.clone())
            .ok_or_else(|| Error::MissingParameterValue(format!(
                "node {} has no nic with an ip associated with it",
                node.name
            )))
    }
}

impl Default for PxeBoot {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BootPlugin for PxeBoot {
    fn validate(&self, node: &Node) -> Result<()> {
        Self::primary_mac(node)?;
        Ok(())
    }

    fn gen_dhcp_opts(&self, node: &Node, ctx: &BootContext) -> Result<DhcpOpts> {
        let mac = Self::primary_mac(node)?;
        let ip = Self::primary_ip(node).ok();
        let mut opts = DhcpOpts::new(mac, ip, node.name.clone(), ctx.host_ip.clone());
        let mut vendor_class = HashMap::new();
        vendor_class.insert("ScaleMP".to_string(), "vsmp/pxelinux.0".to_string());
        vendor_class.insert("other".to_string(), "pxelinux.0".to_string());
        opts.vendor_class_boot_file = Some(vendor_class);
        Ok(opts)
    }

    async fn build_boot_conf(&self, node: &Node, os_boot_str: &str, osimage: &OsImage, ctx: &BootContext) -> Result<()> {
        let node_path = Self::tftp_root_for_node(ctx, node);
        let osimage_path = osimage.tree_path(&ctx.tftp_dir);
        tokio::fs::create_dir_all(&node_path)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to create {}: {e}", node_path.display())))?;

        let kernel = osimage_path.join("vmlinuz");
        if !kernel.exists() {
            return Err(Error::not_found(NotFoundKind::File(kernel.display().to_string())));
        }
        let initrd = osimage_path.join("initrd.img");
        if !initrd.exists() {
            return Err(Error::not_found(NotFoundKind::File(initrd.display().to_string())));
        }

        let link_kernel = node_path.join("vmlinuz");
        let link_initrd = node_path.join("initrd.img");
        let _ = tokio::fs::remove_file(&link_kernel).await;
        let _ = tokio::fs::remove_file(&link_initrd).await;
        tokio::fs::symlink(&kernel, &link_kernel)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to link kernel: {e}")))?;
        tokio::fs::symlink(&initrd, &link_initrd)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to link initrd: {e}")))?;

        let config_path = Self::config_path(ctx, node);
        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Unclassified(format!("failed to create {}: {e}", parent.display())))?;
        }
        let config = format!(
            "DEFAULT xcat\nLABEL xcat\nKERNEL {}\nAPPEND initrd={} {os_boot_str}\n",
            link_kernel.display(),
            link_initrd.display()
        );
        tokio::fs::write(&config_path, config)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to write {}: {e}", config_path.display())))?;

        let mac = Self::primary_mac(node)?;
        let mac_path = Self::mac_path(ctx, &mac);
        let _ = tokio::fs::remove_file(&mac_path).await;
        tokio::fs::symlink(&config_path, &mac_path)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to link mac config: {e}")))?;
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
        if let Ok(mac) = Self::primary_mac(node) {
            let _ = tokio::fs::remove_file(Self::mac_path(ctx, &mac)).await;
        }
        let _ = tokio::fs::remove_dir_all(Self::tftp_root_for_node(ctx, node)).await;
        if let Some(parent) = Self::config_path(ctx, node).parent() {
            let _ = tokio::fs::remove_dir_all(parent).await;
        }
        Ok(())
    }
}
