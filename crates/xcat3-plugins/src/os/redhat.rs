//! Red Hat family (RHEL/CentOS) OS plugin: a plain Anaconda
//! `inst.ks=`/`inst.repo=` kernel command line, no kickstart templating
//! beyond that — kickstart rendering is left to a post-install script
//! copied into the install tree once at startup, which the pipeline's
//! on-disk layout setup already covers. Delegates to
//! `GenericOsPlugin::render`, since the two share the same autoinst
//! layout.

use super::{GenericOsPlugin, OsContext, OsPlugin};
use async_trait::async_trait;
use xcat3_common::Result;
use xcat3_db::{Node, OsImage};

pub struct RedhatOsPlugin {
    generic: GenericOsPlugin,
}

impl RedhatOsPlugin {
    pub fn new() -> Self {
        Self { generic: GenericOsPlugin::new() }
    }
}

impl Default for RedhatOsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsPlugin for RedhatOsPlugin {
    fn validate(&self, node: &Node, osimage: &OsImage) -> Result<()> {
        self.generic.validate(node, osimage)
    }

    fn build_os_boot_str(&self, node: &Node, osimage: &OsImage, ctx: &OsContext) -> Result<String> {
        let mirror = format!("{}{}/{}", osimage.distro, osimage.ver, osimage.arch);
        Ok(format!(
            "inst.ks=http://{host}/install/autoinst/{node} inst.repo=http://{host}/install/{mirror}",
            host = ctx.host_ip,
            node = node.name,
        ))
    }

    async fn render(&self, node: &Node, osimage: &OsImage, password: Option<&str>, ctx: &OsContext) -> Result<()> {
        self.generic.render(node, osimage, password, ctx).await
    }

    async fn clean(&self, node: &Node, ctx: &OsContext) -> Result<()> {
        self.generic.clean(node, ctx).await
    }
}
