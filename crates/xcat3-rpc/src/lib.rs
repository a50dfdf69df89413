//! The wire protocol and transport layer between the API, conductor,
//! and network services (§6 RPC, §4.4/§4.5/§4.9). A worker owns one
//! handler per topic; callers address a `(hostname, topic)` pair rather
//! than parsing a combined topic string back apart.

pub mod envelope;
pub mod handler;
pub mod http;
pub mod inprocess;
pub mod topic;
pub mod transport;

pub use envelope::{RpcEnvelope, RpcErrorBody, RpcReply};
pub use handler::RpcHandler;
pub use http::HttpTransport;
pub use inprocess::InProcessTransport;
pub use topic::topic_for;
pub use transport::Transport;
