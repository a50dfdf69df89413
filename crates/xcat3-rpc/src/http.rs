//! HTTP transport: the production wiring between API/conductor/network
//! workers, addressed by topic over `axum` (server) / `reqwest`
//! (client).

use crate::envelope::{RpcEnvelope, RpcReply};
use crate::handler::RpcHandler;
use crate::transport::Transport;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use xcat3_common::{Error, Result};

pub struct HttpTransport {
    client: reqwest::Client,
    port: u16,
}

impl HttpTransport {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds with default TLS config"),
            port,
        }
    }

    fn url(&self, hostname: &str, topic: &str) -> String {
        format!("http://{hostname}:{}/rpc/{}", self.port, urlencode(topic))
    }
}

fn urlencode(topic: &str) -> String {
    topic.replace('%', "%25").replace('/', "%2F")
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.url(hostname, topic))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("rpc call to {hostname} failed: {e}")))?;
        let reply: RpcReply = resp
            .json()
            .await
            .map_err(|e| Error::Unclassified(format!("rpc reply from {hostname} undecodable: {e}")))?;
        match (reply.result, reply.error) {
            (Some(result), _) => Ok(result),
            (None, Some(err)) => Err(Error::Unclassified(err.message)),
            (None, None) => Err(Error::Unclassified("rpc reply carried neither result nor error".to_string())),
        }
    }

    async fn cast(&self, hostname: &str, topic: &str, envelope: RpcEnvelope) -> Result<()> {
        self.client
            .post(self.url(hostname, topic))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::Unclassified(format!("rpc cast to {hostname} failed: {e}")))?;
        Ok(())
    }
}

struct ServerState {
    topic: String,
    handler: Arc<dyn RpcHandler>,
}

/// Mounts a single `/rpc/:topic` route; each worker binds the router to
/// its own topic, so a mismatched path segment is rejected rather than
/// silently dispatched (a worker only ever answers for the topic it
/// actually registered for, §4.4).
pub fn router(topic: String, handler: Arc<dyn RpcHandler>) -> Router {
    let state = Arc::new(ServerState { topic, handler });
    Router::new().route("/rpc/{topic}", post(dispatch)).with_state(state)
}

async fn dispatch(
    State(state): State<Arc<ServerState>>,
    Path(topic): Path<String>,
    Json(envelope): Json<RpcEnvelope>,
) -> Json<RpcReply> {
    if topic != state.topic {
        return Json(RpcReply::err(format!("this worker does not own topic {topic}"), 404));
    }
    match state.handler.handle(&envelope.method, envelope.kwargs).await {
        Ok(result) => Json(RpcReply::ok(result)),
        Err(e) => Json(RpcReply::err(e.to_string(), e.faultcode())),
    }
}
