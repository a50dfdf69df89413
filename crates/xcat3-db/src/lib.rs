//! C1 Data store + C2 Object layer (§4.1, §4.2): typed records with
//! change-tracking, the `Store` trait every backend implements, a
//! MySQL-backed implementation, and an in-memory `FakeStore` for the
//! seed end-to-end tests.

pub mod dhcp;
pub mod fake;
pub mod network;
pub mod nic;
pub mod node;
pub mod osimage;
pub mod passwd;
pub mod pool;
pub mod record;
pub mod registration;
pub mod service;
pub mod store;

pub use dhcp::DhcpBlob;
pub use fake::FakeStore;
pub use network::Network;
pub use nic::Nic;
pub use node::{ControlInfo, Node};
pub use osimage::OsImage;
pub use passwd::Passwd;
pub use pool::MysqlStore;
pub use record::Entity;
pub use registration::ServiceRegistration;
pub use service::Service;
pub use store::Store;
