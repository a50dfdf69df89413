//! The Passwd entity (§3). `password` is stored crypted via
//! `xcat3_common::crypt::crypt_password` before persistence; see
//! `xcat3-conductor`'s provisioning pipeline (§4.7 step 4).

use crate::record::Entity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_common::crypt::CryptMethod;
use xcat3_macros::Record;

#[derive(Debug, Clone, Record, Serialize, Deserialize)]
pub struct Passwd {
    pub id: Option<u64>,
    pub key: String,
    pub username: String,
    pub password: String,
    #[serde(skip)]
    pub crypt_method: Option<CryptMethod>,
    #[serde(skip)]
    pub changed: HashSet<&'static str>,
}

impl Passwd {
    pub fn new(key: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            username: username.into(),
            password: password.into(),
            crypt_method: None,
            changed: HashSet::new(),
        }
    }
}

impl Entity for Passwd {
    fn table_name() -> &'static str {
        "passwds"
    }

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}
