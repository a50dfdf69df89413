//! §6a configuration loading. The teacher hard-codes its connection
//! parameters in `main.rs`; every worker binary here instead loads a
//! `Config` from a TOML file with environment override, via `figment`.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorConfig {
    pub workers_pool_size: usize,
    pub timeout_secs: u64,
    pub node_locked_retry_attempts: u32,
    pub node_locked_retry_interval_secs: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            workers_pool_size: 64,
            timeout_secs: 60,
            node_locked_retry_attempts: 3,
            node_locked_retry_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host_ip: String,
    pub port: u16,
    pub workers_pool_size: usize,
    pub per_group_count: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host_ip: "0.0.0.0".to_string(),
            port: 3000,
            workers_pool_size: 32,
            per_group_count: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub omapi_secret: String,
    pub omapi_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            omapi_secret: String::new(),
            omapi_port: 7911,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    pub install_dir: String,
    pub tftp_dir: String,
    pub copycd_timeout_secs: u64,
    /// Path to the controller's own SSH public key, served back to a
    /// node on a `fetch_ssh_pub` provisioning callback (§4.7).
    #[serde(default)]
    pub ssh_pub_key_path: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            install_dir: "/var/lib/xcat3/install".to_string(),
            tftp_dir: "/var/lib/xcat3/tftpboot".to_string(),
            copycd_timeout_secs: 600,
            ssh_pub_key_path: None,
        }
    }
}

/// Every §6 env var/config knob, grouped the way spec.md groups them
/// (`conductor.*`, `api.*`, `network.*`, `deploy.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub db: DbConfig,
    #[serde(default)]
    pub conductor: ConductorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl Config {
    /// `Figment::new().merge(Toml::file(path)).merge(Env::prefixed(...))`:
    /// TOML-file-with-env-override, the idiom the bare-metal-provisioning
    /// reference manifest's `figment` dependency exists for.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("XCAT3_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conductor_defaults_match_spec_expectations() {
        let c = ConductorConfig::default();
        assert!(c.workers_pool_size > 0);
        assert!(c.node_locked_retry_attempts > 0);
    }
}
