//! Shared autoinst-tree plumbing: lays out `install_dir/autoinst` and
//! `install_dir/scripts` (seeding the post-install hook script once),
//! writes the per-node template, and symlinks the shared post-install
//! script under a node-specific name. Used directly as the fallback OS
//! plugin for any distro the registry doesn't have a dedicated plugin
//! for, and reused by `RedhatOsPlugin` for its autoinst layout.

use super::{OsContext, OsPlugin};
use async_trait::async_trait;
use std::path::Path;
use xcat3_common::{Error, Result};
use xcat3_db::{Node, OsImage};

const POST_SCRIPT_NAME: &str = "post.py";

pub struct GenericOsPlugin;

impl GenericOsPlugin {
    pub fn new() -> Self {
        Self
    }

    fn autoinst_dir(ctx: &OsContext) -> std::path::PathBuf {
        Path::new(&ctx.install_dir).join("autoinst")
    }

    fn scripts_dir(ctx: &OsContext) -> std::path::PathBuf {
        Path::new(&ctx.install_dir).join("scripts")
    }

    /// Lays out `autoinst/` and `scripts/`, seeding the shared
    /// post-install script once if it isn't already present (§4.3,
    /// `_ensure`'s idempotence check).
    async fn ensure_layout(ctx: &OsContext) -> Result<()> {
        let scripts_dir = Self::scripts_dir(ctx);
        let post_script = scripts_dir.join(POST_SCRIPT_NAME);
        if post_script.exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(Self::autoinst_dir(ctx))
            .await
            .map_err(|e| Error::Unclassified(format!("failed to create autoinst dir: {e}")))?;
        tokio::fs::create_dir_all(&scripts_dir)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to create scripts dir: {e}")))?;
        tokio::fs::write(&post_script, "#!/usr/bin/env python3\n# post-install reporting hook\n")
            .await
            .map_err(|e| Error::Unclassified(format!("failed to seed {}: {e}", post_script.display())))?;
        Ok(())
    }
}

impl Default for GenericOsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsPlugin for GenericOsPlugin {
    fn validate(&self, _node: &Node, osimage: &OsImage) -> Result<()> {
        if osimage.distro.is_empty() || osimage.ver.is_empty() || osimage.arch.is_empty() {
            return Err(Error::MissingParameterValue(format!(
                "osimage {} is missing distro/ver/arch",
                osimage.name
            )));
        }
        Ok(())
    }

    fn build_os_boot_str(&self, _node: &Node, _osimage: &OsImage, _ctx: &OsContext) -> Result<String> {
        Ok(String::new())
    }

    async fn render(&self, node: &Node, osimage: &OsImage, password: Option<&str>, ctx: &OsContext) -> Result<()> {
        Self::ensure_layout(ctx).await?;
        let mirror = format!("{}{}/{}", osimage.distro, osimage.ver, osimage.arch);
        let body = format!(
            "# autoinst profile for {node}\nmirror={mirror}\nhost_ip={host}\napi={api_ip}:{api_port}\npassword={pw}\n",
            node = node.name,
            host = ctx.host_ip,
            api_ip = ctx.api_host_ip,
            api_port = ctx.api_port,
            pw = password.unwrap_or(""),
        );
        let node_tmpl = Self::autoinst_dir(ctx).join(&node.name);
        tokio::fs::write(&node_tmpl, body)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to write {}: {e}", node_tmpl.display())))?;

        let scripts_dir = Self::scripts_dir(ctx);
        let post_script = scripts_dir.join(POST_SCRIPT_NAME);
        let node_link = scripts_dir.join(format!("{}.py", node.name));
        let _ = tokio::fs::remove_file(&node_link).await;
        tokio::fs::symlink(&post_script, &node_link)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to link post script: {e}")))?;
        Ok(())
    }

    async fn clean(&self, node: &Node, ctx: &OsContext) -> Result<()> {
        let _ = tokio::fs::remove_file(Self::autoinst_dir(ctx).join(&node.name)).await;
        let _ = tokio::fs::remove_file(Self::scripts_dir(ctx).join(format!("{}.py", node.name))).await;
        Ok(())
    }
}
