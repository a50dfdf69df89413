//! Ambient stack shared by every worker process: error taxonomy, the
//! `Outcome` per-node result channel, configuration loading, logging
//! setup and the password crypt helper.

pub mod config;
pub mod crypt;
pub mod error;
pub mod logging;
pub mod states;

pub use error::{Error, NotFoundKind, Result};
pub use states::{BootDevice, PowerState, ProvisionState, ServiceKind};
