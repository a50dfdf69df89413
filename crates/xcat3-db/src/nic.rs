//! The Nic entity (§3), grounded in `models.py`'s `Nics` model.

use crate::record::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_macros::Record;

#[derive(Debug, Clone, Record, Serialize, Deserialize)]
pub struct Nic {
    pub id: Option<u64>,
    pub uuid: String,
    pub mac: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub node_id: Option<u64>,
    pub primary: bool,
    pub extra: serde_json::Value,
    #[serde(skip)]
    pub changed: HashSet<&'static str>,
}

impl Nic {
    pub fn new(mac: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: uuid::Uuid::new_v4().to_string(),
            mac: normalize_mac(&mac.into()),
            name: None,
            ip: None,
            netmask: None,
            node_id: None,
            primary: false,
            extra: serde_json::Value::Null,
            changed: HashSet::new(),
        }
    }

    /// §9: `extra.primary` is a legacy alias, consulted only if the
    /// dedicated column has never been set.
    pub fn effective_primary(&self) -> bool {
        if self.changed.contains("primary") {
            return self.primary;
        }
        self.extra
            .get("primary")
            .and_then(|v| v.as_bool())
            .unwrap_or(self.primary)
    }
}

/// MAC addresses are globally unique and case-normalized (§3).
pub fn normalize_mac(mac: &str) -> String {
    mac.to_ascii_lowercase()
}

impl Entity for Nic {
    fn table_name() -> &'static str {
        "nics"
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
    fn mac_is_case_normalized_on_construction() {
        let nic = Nic::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(nic.mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn legacy_extra_primary_alias_is_read_when_column_unset() {
        let mut nic = Nic::new("aa:bb:cc:dd:ee:ff");
        nic.clear_changed();
        nic.extra = serde_json::json!({"primary": true});
        assert!(nic.effective_primary());
    }

    #[test]
    fn explicit_column_write_wins_over_legacy_alias() {
        let mut nic = Nic::new("aa:bb:cc:dd:ee:ff");
        nic.extra = serde_json::json!({"primary": true});
        nic.set_primary(false);
        assert!(!nic.effective_primary());
    }
}
