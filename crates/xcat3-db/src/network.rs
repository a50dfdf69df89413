//! The Network entity (§3).

use crate::record::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_macros::Record;

#[derive(Debug, Clone, Record, Serialize, Deserialize)]
pub struct Network {
    pub id: Option<u64>,
    pub name: String,
    pub subnet: String,
    pub netmask: String,
    pub gateway: Option<String>,
    pub nameservers: Vec<String>,
    pub ntpservers: Vec<String>,
    pub domain: Option<String>,
    pub dynamic_range: Option<String>,
    pub extra: serde_json::Value,
    #[serde(skip)]
    pub changed: HashSet<&'static str>,
}

impl Network {
    pub fn new(name: impl Into<String>, subnet: impl Into<String>, netmask: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            subnet: subnet.into(),
            netmask: netmask.into(),
            gateway: None,
            nameservers: Vec::new(),
            ntpservers: Vec::new(),
            domain: None,
            dynamic_range: None,
            extra: serde_json::Value::Null,
            changed: HashSet::new(),
        }
    }

    /// A `(subnet, netmask)` id string used by §4.9 `check_support`
    /// routing to compare against a rendered subnet's `subnet_id`.
    pub fn subnet_id(&self) -> String {
        format!("{}/{}", self.subnet, self.netmask)
    }
}

impl Entity for Network {
    fn table_name() -> &'static str {
        "networks"
    }

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}
