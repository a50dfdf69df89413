//! The public HTTP API worker process (§6). Unlike `xcat3-conductor`
//! and `xcat3-network-agent` this process is not itself a registered
//! [`xcat3_common::states::ServiceKind`] — it is the client-facing
//! front door, not a fan-out target another worker routes RPCs to — so
//! it has no `ServiceRegistration`/heartbeat loop of its own.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use xcat3_common::config::Config;
use xcat3_conductor::{BulkDispatcher, NetworkClient};
use xcat3_db::{MysqlStore, Store};
use xcat3_rpc::HttpTransport;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "XCAT3_CONFIG", default_value = "/etc/xcat3/api.toml")]
    config: String,
    #[arg(long, default_value_t = 2)]
    verbosity: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    xcat3_common::logging::init("xcat3-api", args.verbosity).expect("logging initializes");

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        log::error!("failed to load config from {}: {e}", args.config);
        std::process::exit(1);
    });

    let db_url = format!("mysql://{}:{}@{}/{}", config.db.user, config.db.password, config.db.host, config.db.database);
    let store: Arc<dyn Store> = Arc::new(MysqlStore::connect(&db_url).unwrap_or_else(|e| {
        log::error!("failed to connect to data store: {e}");
        std::process::exit(1);
    }));

    let rpc_timeout = Duration::from_secs(config.conductor.timeout_secs);
    let transport = Arc::new(HttpTransport::new(config.api.port, rpc_timeout));
    let dispatcher = Arc::new(BulkDispatcher::new(store.clone(), transport.clone(), config.heartbeat_timeout_secs as i64, config.api.workers_pool_size));
    let network_client = Arc::new(NetworkClient::new(store.clone(), transport.clone(), config.heartbeat_timeout_secs as i64));

    let state = xcat3_api::state::AppState {
        store,
        dispatcher,
        network_client,
        transport,
        rpc_timeout,
        heartbeat_timeout_secs: config.heartbeat_timeout_secs as i64,
    };

    let app = xcat3_api::build_router(state);
    let addr = format!("{}:{}", config.api.host_ip, config.api.port);
    log::info!("xcat3-api listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        log::error!("failed to bind {addr}: {e}");
        std::process::exit(1);
    });
    axum::serve(listener, app).await.unwrap_or_else(|e| {
        log::error!("server exited: {e}");
        std::process::exit(1);
    });
}
