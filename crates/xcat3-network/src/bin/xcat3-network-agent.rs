//! The network service worker process (C9, §4.9). Loads configuration,
//! connects to the store, builds the DHCP engine, performs the initial
//! `restart_dhcp`, registers itself in the service registry, and starts
//! its heartbeat loop alongside the RPC server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use xcat3_common::config::Config;
use xcat3_common::states::ServiceKind;
use xcat3_db::{MysqlStore, ServiceRegistration, Store};
use xcat3_network::{IscDhcpService, NetworkManager, NetworkRpcHandler};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "XCAT3_CONFIG", default_value = "/etc/xcat3/network.toml")]
    config: String,
    #[arg(long, default_value_t = 2)]
    verbosity: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    xcat3_common::logging::init("xcat3-network-agent", args.verbosity).expect("logging initializes");

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        log::error!("failed to load config from {}: {e}", args.config);
        std::process::exit(1);
    });

    let db_url = format!("mysql://{}:{}@{}/{}", config.db.user, config.db.password, config.db.host, config.db.database);
    let store: Arc<dyn Store> = Arc::new(MysqlStore::connect(&db_url).unwrap_or_else(|e| {
        log::error!("failed to connect to data store: {e}");
        std::process::exit(1);
    }));

    let dhcp_dir = PathBuf::from(&config.deploy.tftp_dir).join("..").join("dhcp");
    let dhcp = Arc::new(IscDhcpService::new(
        dhcp_dir.join("dhcpd.conf"),
        dhcp_dir.join("dhcpd.pid"),
        dhcp_dir.join("dhcpd.leases"),
        config.network.omapi_port,
        config.network.omapi_secret.clone(),
    ));

    let manager = Arc::new(NetworkManager::new(store.clone(), dhcp));
    if let Err(e) = manager.init().await {
        log::error!("initial dhcp rebuild failed: {e}");
    }

    let (registration, _service) = ServiceRegistration::register(
        store.clone(),
        config.host.clone(),
        ServiceKind::Network,
        1,
        Duration::from_secs(config.heartbeat_interval_secs),
    )
    .await
    .unwrap_or_else(|e| {
        log::error!("failed to register network service: {e}");
        std::process::exit(1);
    });

    let handler = Arc::new(NetworkRpcHandler { manager });
    let topic = xcat3_rpc::topic_for(ServiceKind::Network, &config.host);

    tokio::spawn(async move { registration.run_heartbeat().await });

    let app = xcat3_rpc::http::router(topic, handler);
    let addr = format!("0.0.0.0:{}", config.api.port);
    log::info!("xcat3-network-agent listening on {addr} as {}", config.host);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        log::error!("failed to bind {addr}: {e}");
        std::process::exit(1);
    });
    axum::serve(listener, app).await.unwrap_or_else(|e| {
        log::error!("server exited: {e}");
        std::process::exit(1);
    });
}
