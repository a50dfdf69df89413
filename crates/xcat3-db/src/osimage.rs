//! The OSImage entity (§3). Keyed `(distro, ver, arch)`; `orig_name` is
//! the backed-up ISO filename used as a cache key for the copycd step
//! (§4.7/3).

use crate::record::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_macros::Record;

#[derive(Debug, Clone, Record, Serialize, Deserialize)]
pub struct OsImage {
    pub id: Option<u64>,
    pub name: String,
    pub distro: String,
    pub ver: String,
    pub arch: String,
    pub profile: Option<String>,
    pub image_type: Option<String>,
    pub provmethod: Option<String>,
    pub rootfstype: Option<String>,
    pub orig_name: String,
    #[serde(skip)]
    pub changed: HashSet<&'static str>,
}

impl OsImage {
    pub fn new(
        name: impl Into<String>,
        distro: impl Into<String>,
        ver: impl Into<String>,
        arch: impl Into<String>,
        orig_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            distro: distro.into(),
            ver: ver.into(),
            arch: arch.into(),
            profile: None,
            image_type: None,
            provmethod: None,
            rootfstype: None,
            orig_name: orig_name.into(),
            changed: HashSet::new(),
        }
    }

    /// The on-disk tree path this image must exist at before a
    /// provision can proceed (§4.7/3, §8 invariant 3).
    pub fn tree_path(&self, install_dir: &str) -> std::path::PathBuf {
        std::path::Path::new(install_dir).join(format!("{}{}", self.distro, self.ver)).join(&self.arch)
    }
}

impl Entity for OsImage {
    fn table_name() -> &'static str {
        "osimages"
    }

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_path_matches_invariant_3_layout() {
        let img = OsImage::new("centos-7.3-x86_64", "centos", "7.3", "x86_64", "centos-7.3.iso");
        assert_eq!(
            img.tree_path("/var/lib/xcat3/install"),
            std::path::PathBuf::from("/var/lib/xcat3/install/centos7.3/x86_64")
        );
    }
}
