//! The DHCP option blob (§3), keyed by node `name` rather than a
//! numeric id — `enable_dhcp_option`'s table is a pure key-value store
//! of pre-rendered config fragments, not an owned entity with its own
//! identity, so it does not implement `Entity`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpBlob {
    pub name: String,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub hostname: String,
    /// Pre-rendered `supersede` statement fragment (§4.10).
    pub statements: String,
    /// Full rendered host block, ready to append into `dhcpd.conf`.
    pub content: String,
}

impl DhcpBlob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: None,
            mac: None,
            hostname: String::new(),
            statements: String::new(),
            content: String::new(),
        }
    }
}
