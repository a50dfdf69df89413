//! The transport abstraction: abstracts the thing that moves bytes so
//! the conductor/network managers and the RPC API layer can be
//! unit-tested against a simple in-process transport without standing
//! up real HTTP servers, while production wiring uses `HttpTransport`.
//!
//! Topic naming itself (`<base>.<hostname>`) is handled by `topic_for`;
//! this trait takes the target hostname and topic as separate arguments
//! rather than parsing one back out of a combined string.

use crate::envelope::RpcEnvelope;
use async_trait::async_trait;
use xcat3_common::Result;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Synchronous RPC: blocks until the target replies or the call
    /// times out.
    async fn call(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<serde_json::Value>;

    /// Fire-and-forget: used by `NetworkAPI::broadcast` (§4.9) to notify
    /// every live network service without waiting on each reply.
    async fn cast(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<()>;
}
