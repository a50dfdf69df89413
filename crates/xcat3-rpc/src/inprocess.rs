//! In-process transport: topics resolve directly to a registered
//! [`RpcHandler`] with no network hop, for the seed end-to-end tests
//! (§8a) that exercise the full API -> conductor -> network call chain
//! against `FakeStore` without binding any sockets.

use crate::envelope::RpcEnvelope;
use crate::handler::RpcHandler;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use xcat3_common::error::NotFoundKind;
use xcat3_common::{Error, Result};

#[derive(Default)]
pub struct InProcessTransport {
    handlers: RwLock<HashMap<String, Arc<dyn RpcHandler>>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler that owns `hostname`'s `topic`. Call this
    /// once per worker at startup, matching the real deployment's
    /// "one handler bound per registered service" shape.
    pub fn register(&self, hostname: &str, topic: &str, handler: Arc<dyn RpcHandler>) {
        self.handlers.write().unwrap().insert(key(hostname, topic), handler);
    }

    fn lookup(&self, hostname: &str, topic: &str) -> Result<Arc<dyn RpcHandler>> {
        self.handlers
            .read()
            .unwrap()
            .get(&key(hostname, topic))
            .cloned()
            .ok_or_else(|| Error::not_found(NotFoundKind::Service(format!("{hostname} ({topic})"))))
    }
}

fn key(hostname: &str, topic: &str) -> String {
    format!("{topic}@{hostname}")
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn call(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<serde_json::Value> {
        let handler = self.lookup(hostname, topic)?;
        handler.handle(&envelope.method, envelope.kwargs).await
    }

    async fn cast(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<()> {
        let handler = self.lookup(hostname, topic)?;
        handler.handle(&envelope.method, envelope.kwargs).await?;
        Ok(())
    }
}
