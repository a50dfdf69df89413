//! C9 network service (§4.9/§4.10): ISC dhcpd daemon supervision,
//! per-subnet/per-node DHCP config rendering, and the RPC surface
//! `xcat3-conductor`'s `NetworkClient` calls into.

pub mod dhcp;
pub mod handler;
pub mod manager;

pub use dhcp::{IscDhcpService, SubnetOpts};
pub use handler::NetworkRpcHandler;
pub use manager::NetworkManager;
