//! The wire envelope: every RPC is a method name plus a kwargs object,
//! carried here as one serializable struct since the transport needs
//! something concrete to put on the wire.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub method: String,
    pub kwargs: serde_json::Value,
}

impl RpcEnvelope {
    pub fn new(method: impl Into<String>, kwargs: serde_json::Value) -> Self {
        Self { method: method.into(), kwargs }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub message: String,
    pub code: i32,
}

impl RpcReply {
    pub fn ok(result: serde_json::Value) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn err(message: impl Into<String>, code: i32) -> Self {
        Self { result: None, error: Some(RpcErrorBody { message: message.into(), code }) }
    }
}
