//! The Service entity (§3/§4.4): one row per registered worker process.

use crate::record::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use xcat3_common::states::ServiceKind;
use xcat3_macros::Record;

#[derive(Debug, Clone, Record, Serialize, Deserialize)]
pub struct Service {
    pub id: Option<u64>,
    pub hostname: String,
    pub kind: ServiceKind,
    pub workers: u32,
    pub online: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub changed: HashSet<&'static str>,
}

impl Service {
    pub fn new(hostname: impl Into<String>, kind: ServiceKind, workers: u32) -> Self {
        Self {
            id: None,
            hostname: hostname.into(),
            kind,
            workers: workers.max(1),
            online: true,
            updated_at: Utc::now(),
            changed: HashSet::new(),
        }
    }

    /// §3/§5: live iff online and heartbeated within the timeout window.
    pub fn is_live(&self, now: DateTime<Utc>, heartbeat_timeout_secs: i64) -> bool {
        self.online && (now - self.updated_at).num_seconds() <= heartbeat_timeout_secs
    }

    /// RPC fan-out weight (§4.5): `max(workers, 1)`.
    pub fn weight(&self) -> u32 {
        self.workers.max(1)
    }

    pub fn topic(&self) -> String {
        format!("{}.{}", self.kind.topic_base(), self.hostname)
    }
}

impl Entity for Service {
    fn table_name() -> &'static str {
        "services"
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
    use chrono::Duration;

    #[test]
    fn stale_heartbeat_is_not_live() {
        let mut svc = Service::new("conductor-1", ServiceKind::Conductor, 4);
        svc.updated_at = Utc::now() - Duration::seconds(120);
        assert!(!svc.is_live(Utc::now(), 60));
    }

    #[test]
    fn fresh_heartbeat_is_live() {
        let svc = Service::new("conductor-1", ServiceKind::Conductor, 4);
        assert!(svc.is_live(Utc::now(), 60));
    }

    #[test]
    fn weight_floors_at_one() {
        let svc = Service::new("conductor-1", ServiceKind::Conductor, 0);
        assert_eq!(svc.weight(), 1);
    }
}
