//! The server-side counterpart of [`crate::transport::Transport`]: each
//! worker process registers one [`RpcHandler`] per topic it owns, and
//! both [`crate::inprocess::InProcessTransport`] and
//! [`crate::http::serve`] dispatch incoming envelopes into it.

use async_trait::async_trait;
use xcat3_common::Result;

#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(&self, method: &str, kwargs: serde_json::Value) -> Result<serde_json::Value>;
}
