//! ISC dhcpd daemon supervision + config rendering (§4.9/§4.10).
//! No OMAPI client crate exists in this ecosystem, so `status` probes
//! the OMAPI TCP port directly rather than speaking the protocol. The
//! daemon lifecycle timing (10s start poll, 5s stop wait, SIGTERM
//! before SIGKILL) and the global/subnet/node config layout in
//! `build_conf` follow §4.9/§4.10 exactly.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;

use xcat3_common::{Error, Result};
use xcat3_db::Store;

/// One network's rendered `subnet { ... }` block (§4.9 `_restart_dhcp`'s
/// per-network opts dict).
#[derive(Debug, Clone)]
pub struct SubnetOpts {
    pub nic: String,
    pub subnet: String,
    pub netmask: String,
    pub netbits: u8,
    pub conductor: String,
    pub next_server: String,
    pub router: String,
    pub domain_name: Option<String>,
    pub domain_name_servers: Vec<String>,
    pub domain_search: Option<String>,
    /// Matches [`xcat3_db::Network::subnet_id`], compared against by
    /// `check_support`.
    pub subnet_id: String,
}

impl SubnetOpts {
    fn render(&self) -> String {
        let mut lines = vec![format!("subnet {} netmask {} {{", self.subnet, self.netmask)];
        lines.push(format!("\toption routers {};", self.router));
        if !self.domain_name_servers.is_empty() {
            lines.push(format!("\toption domain-name-servers {};", self.domain_name_servers.join(", ")));
        }
        if let Some(domain) = &self.domain_name {
            lines.push(format!("\toption domain-name \"{domain}\";"));
        }
        if let Some(search) = &self.domain_search {
            lines.push(format!("\toption domain-search \"{search}\";"));
        }
        lines.push(format!("\tnext-server {};", self.next_server));
        lines.push("}".to_string());
        lines.join("\n")
    }
}

/// Owns the dhcpd process this worker supervises. One instance per
/// `xcat3-network-agent`.
pub struct IscDhcpService {
    conf_path: PathBuf,
    pid_path: PathBuf,
    lease_path: PathBuf,
    omapi_port: u16,
    omapi_secret: String,
    child: Mutex<Option<Child>>,
    subnet_opts: Mutex<Vec<SubnetOpts>>,
}

impl IscDhcpService {
    pub fn new(conf_path: PathBuf, pid_path: PathBuf, lease_path: PathBuf, omapi_port: u16, omapi_secret: String) -> Self {
        if let Some(parent) = lease_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if !lease_path.exists() {
            let _ = std::fs::write(&lease_path, "");
        }
        Self {
            conf_path,
            pid_path,
            lease_path,
            omapi_port,
            omapi_secret,
            child: Mutex::new(None),
            subnet_opts: Mutex::new(Vec::new()),
        }
    }

    pub async fn clear_subnets(&self) {
        self.subnet_opts.lock().await.clear();
    }

    pub async fn add_subnet(&self, opts: SubnetOpts) {
        self.subnet_opts.lock().await.push(opts);
    }

    pub async fn subnet_opts(&self) -> Vec<SubnetOpts> {
        self.subnet_opts.lock().await.clone()
    }

    /// OMAPI-less liveness probe: `status()` in the original speaks
    /// OMAPI and treats `ECONNREFUSED` as "not running"; this dials the
    /// same port and treats a failed connect the same way.
    pub async fn status(&self) -> bool {
        tokio::net::TcpStream::connect(("127.0.0.1", self.omapi_port)).await.is_ok()
    }

    /// Starts dhcpd and polls [`Self::status`] for up to 10s, matching
    /// `utils.wait_process`'s timeout. A dhcpd that never answers is
    /// logged, not treated as fatal — `enable_dhcp_option`/`restart_dhcp`
    /// callers still get a reply either way.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let child = Command::new("dhcpd")
            .args(["-user", "dhcpd", "-group", "dhcpd", "-f", "-q", "-4"])
            .arg("-pf")
            .arg(&self.pid_path)
            .arg("-cf")
            .arg(&self.conf_path)
            .arg("-lf")
            .arg(&self.lease_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Unclassified(format!("failed to execute dhcpd: {e}")))?;
        *guard = Some(child);
        drop(guard);

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if self.status().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!("dhcp: dhcpd did not answer on port {} within 10s of starting", self.omapi_port);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// SIGTERM, then poll for up to 5s, escalating to SIGKILL — mirrors
    /// `utils.kill_child_process(pid, 5)`. Falls back to the PID file
    /// when this worker didn't spawn the process itself (a restart
    /// after a crashed `xcat3-network-agent`).
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        let pid = match guard.as_ref().and_then(|c| c.id()) {
            Some(pid) => Some(pid),
            None => Self::read_pid_file(&self.pid_path),
        };
        let Some(pid) = pid else {
            log::warn!("dhcp: stop requested but no running dhcpd process was found");
            return Ok(());
        };
        let nix_pid = Pid::from_raw(pid as i32);
        let _ = kill(nix_pid, Signal::SIGTERM);

        let deadline = Instant::now() + Duration::from_secs(5);
        while Self::process_alive(nix_pid) {
            if Instant::now() >= deadline {
                let _ = kill(nix_pid, Signal::SIGKILL);
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        if let Some(mut child) = guard.take() {
            let _ = child.wait().await;
        }
        Ok(())
    }

    /// isc-dhcp-server has no HUP reload, so restart is stop-then-start.
    pub async fn restart(&self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Global OMAPI block + every subnet block + every pre-rendered
    /// per-node host block (already rendered by
    /// [`xcat3_plugins::DhcpOpts::render`] on the conductor side),
    /// written verbatim, then the lease file is truncated since
    /// `restart` will regenerate it.
    pub async fn build_conf(&self, store: &dyn Store) -> Result<()> {
        let blobs = store.get_dhcp_list().await?;
        let node_cfg = blobs.into_iter().map(|b| b.content).collect::<Vec<_>>().join("\n");
        let subnet_cfg = self
            .subnet_opts
            .lock()
            .await
            .iter()
            .map(SubnetOpts::render)
            .collect::<Vec<_>>()
            .join("\n");
        let cfg = format!("{}{subnet_cfg}\n{node_cfg}", self.global_cfg());
        tokio::fs::write(&self.conf_path, cfg)
            .await
            .map_err(|e| Error::Unclassified(format!("failed to write {}: {e}", self.conf_path.display())))?;
        tokio::fs::write(&self.lease_path, "")
            .await
            .map_err(|e| Error::Unclassified(format!("failed to truncate {}: {e}", self.lease_path.display())))?;
        Ok(())
    }

    fn global_cfg(&self) -> String {
        format!(
            "omapi-port {};\nkey xcat3-omapi-key {{\n\talgorithm hmac-md5;\n\tsecret \"{}\";\n}}\nomapi-key xcat3-omapi-key;\n\n",
            self.omapi_port, self.omapi_secret
        )
    }

    fn read_pid_file(path: &std::path::Path) -> Option<u32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    fn process_alive(pid: Pid) -> bool {
        kill(pid, None).is_ok()
    }
}

/// Set bits in a dotted-quad netmask, the prefix length
/// [`ipnetwork::Ipv4Network::new`] wants. `ip_lib.IPWrapper.get_net_bits`'s
/// Rust equivalent.
pub fn netmask_to_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmask_to_prefix_counts_set_bits() {
        assert_eq!(netmask_to_prefix("255.255.255.0".parse().unwrap()), 24);
        assert_eq!(netmask_to_prefix("255.255.0.0".parse().unwrap()), 16);
        assert_eq!(netmask_to_prefix("255.255.255.255".parse().unwrap()), 32);
    }

    #[test]
    fn subnet_opts_render_includes_netmask_and_router() {
        let opts = SubnetOpts {
            nic: "eth0".to_string(),
            subnet: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            netbits: 24,
            conductor: "10.0.0.1".to_string(),
            next_server: "10.0.0.1".to_string(),
            router: "10.0.0.1".to_string(),
            domain_name: Some("cluster.local".to_string()),
            domain_name_servers: vec!["10.0.0.1".to_string()],
            domain_search: None,
            subnet_id: "10.0.0.0/255.255.255.0".to_string(),
        };
        let rendered = opts.render();
        assert!(rendered.contains("subnet 10.0.0.0 netmask 255.255.255.0"));
        assert!(rendered.contains("option routers 10.0.0.1;"));
        assert!(rendered.contains("option domain-name \"cluster.local\";"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn build_conf_concatenates_global_subnet_and_node_blocks() {
        let dir = std::env::temp_dir().join(format!("xcat3-network-dhcp-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let svc = IscDhcpService::new(dir.join("dhcpd.conf"), dir.join("dhcpd.pid"), dir.join("dhcpd.leases"), 7911, "s3cr3t".to_string());
        svc.add_subnet(SubnetOpts {
            nic: "eth0".to_string(),
            subnet: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            netbits: 24,
            conductor: "10.0.0.1".to_string(),
            next_server: "10.0.0.1".to_string(),
            router: "10.0.0.1".to_string(),
            domain_name: None,
            domain_name_servers: vec![],
            domain_search: None,
            subnet_id: "10.0.0.0/255.255.255.0".to_string(),
        })
        .await;

        let store = xcat3_db::FakeStore::new();
        svc.build_conf(&store).await.unwrap();
        let written = tokio::fs::read_to_string(dir.join("dhcpd.conf")).await.unwrap();
        assert!(written.contains("omapi-port 7911;"));
        assert!(written.contains("subnet 10.0.0.0 netmask 255.255.255.0"));
    }
}
