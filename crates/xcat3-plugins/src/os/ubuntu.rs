//! Ubuntu OS plugin: writes a preseed-style template carrying
//! `kcmdline`/`mirror`/`timezone`/`password`/api host+port, then links
//! the shared post-install script under the node's name — identical
//! autoinst layout to `GenericOsPlugin`, reused here rather than
//! duplicated.

use super::{GenericOsPlugin, OsContext, OsPlugin};
use async_trait::async_trait;
use xcat3_common::Result;
use xcat3_db::{Node, OsImage};

pub struct UbuntuOsPlugin {
    generic: GenericOsPlugin,
}

impl UbuntuOsPlugin {
    pub fn new() -> Self {
        Self { generic: GenericOsPlugin::new() }
    }
}

impl Default for UbuntuOsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OsPlugin for UbuntuOsPlugin {
    fn validate(&self, node: &Node, osimage: &OsImage) -> Result<()> {
        self.generic.validate(node, osimage)
    }

    fn build_os_boot_str(&self, _node: &Node, _osimage: &OsImage, ctx: &OsContext) -> Result<String> {
        Ok(format!("auto=true priority=critical url=http://{}/install/autoinst/", ctx.host_ip))
    }

    async fn render(&self, node: &Node, osimage: &OsImage, password: Option<&str>, ctx: &OsContext) -> Result<()> {
        self.generic.render(node, osimage, password, ctx).await
    }

    async fn clean(&self, node: &Node, ctx: &OsContext) -> Result<()> {
        self.generic.clean(node, ctx).await
    }
}
