//! The handler-shared context (§9 "construct once in `main`" — no
//! process-wide globals, an explicit struct threaded through every
//! route via axum's `State` extractor).

use std::sync::Arc;
use std::time::Duration;

use xcat3_conductor::{BulkDispatcher, NetworkClient};
use xcat3_db::Store;
use xcat3_rpc::Transport;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<BulkDispatcher>,
    pub network_client: Arc<NetworkClient>,
    /// Direct transport access for the single-node, affinity-routed
    /// `provision_callback` RPC (§4.7), which bypasses the bulk
    /// dispatcher's sharding entirely — there's exactly one node and
    /// exactly one conductor to reach.
    pub transport: Arc<dyn Transport>,
    /// Deadline for the bulk-dispatcher's join (§4.5 `wait(futures,
    /// timeout)`); mirrors `conductor.timeout` since both ends of one
    /// RPC round-trip share the same budget.
    pub rpc_timeout: Duration,
    /// Liveness window (§3/§5) used by the single-node affinity routing
    /// `provision_callback` needs, outside the bulk dispatcher.
    pub heartbeat_timeout_secs: i64,
}
