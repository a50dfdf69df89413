//! The conductor worker process (C4/C5/C6/C7/C8). Loads configuration,
//! connects to the store, builds the plugin registry and the HTTP RPC
//! surface, registers itself in the service registry, and starts its
//! heartbeat loop alongside the axum server.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use xcat3_common::config::Config;
use xcat3_common::states::ServiceKind;
use xcat3_conductor::{ConductorManager, ConductorRpcHandler, FetchOnlyProvisioner, NetworkClient, NodeWorkerPool, Pipeline, ServiceRegistration, TaskManager};
use xcat3_db::{MysqlStore, Store};
use xcat3_plugins::boot::BootContext;
use xcat3_plugins::os::OsContext;
use xcat3_plugins::PluginRegistry;
use xcat3_rpc::HttpTransport;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "XCAT3_CONFIG", default_value = "/etc/xcat3/conductor.toml")]
    config: String,
    #[arg(long, default_value_t = 2)]
    verbosity: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    xcat3_common::logging::init("xcat3-conductor", args.verbosity).expect("logging initializes");

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        log::error!("failed to load config from {}: {e}", args.config);
        std::process::exit(1);
    });

    let db_url = format!("mysql://{}:{}@{}/{}", config.db.user, config.db.password, config.db.host, config.db.database);
    let store: Arc<dyn Store> = Arc::new(MysqlStore::connect(&db_url).unwrap_or_else(|e| {
        log::error!("failed to connect to data store: {e}");
        std::process::exit(1);
    }));

    let registry = Arc::new(PluginRegistry::new());
    let task_manager = Arc::new(TaskManager::new(
        store.clone(),
        config.conductor.node_locked_retry_attempts,
        Duration::from_secs(config.conductor.node_locked_retry_interval_secs),
    ));
    let worker_pool = Arc::new(NodeWorkerPool::new(
        config.conductor.workers_pool_size,
        Duration::from_secs(config.conductor.timeout_secs),
        config.api.per_group_count,
    ));
    let transport = Arc::new(HttpTransport::new(config.api.port, Duration::from_secs(config.conductor.timeout_secs)));
    let network_client = Arc::new(NetworkClient::new(store.clone(), transport.clone(), config.heartbeat_timeout_secs as i64));

    let (registration, service) = ServiceRegistration::register(
        store.clone(),
        config.host.clone(),
        ServiceKind::Conductor,
        config.conductor.workers_pool_size as u32,
        Duration::from_secs(config.heartbeat_interval_secs),
    )
    .await
    .unwrap_or_else(|e| {
        log::error!("failed to register conductor service: {e}");
        std::process::exit(1);
    });

    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        registry.clone(),
        task_manager.clone(),
        worker_pool.clone(),
        network_client,
        Arc::new(FetchOnlyProvisioner::new()),
        BootContext {
            tftp_dir: config.deploy.tftp_dir.clone(),
            install_dir: config.deploy.install_dir.clone(),
            host_ip: config.api.host_ip.clone(),
        },
        OsContext {
            install_dir: config.deploy.install_dir.clone(),
            host_ip: config.api.host_ip.clone(),
            api_host_ip: config.api.host_ip.clone(),
            api_port: config.api.port,
        },
        config.deploy.install_dir.clone(),
        config.api.host_ip.clone(),
        service.id.expect("registered service carries an id"),
        config.deploy.ssh_pub_key_path.clone(),
    ));

    let manager = Arc::new(ConductorManager::new(store, registry, task_manager, worker_pool, pipeline));
    let handler = Arc::new(ConductorRpcHandler { manager });
    let topic = xcat3_rpc::topic_for(ServiceKind::Conductor, &config.host);

    tokio::spawn(async move { registration.run_heartbeat().await });

    let app = xcat3_rpc::http::router(topic, handler);
    let addr = format!("0.0.0.0:{}", config.api.port);
    log::info!("xcat3-conductor listening on {addr} as {}", config.host);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        log::error!("failed to bind {addr}: {e}");
        std::process::exit(1);
    });
    axum::serve(listener, app).await.unwrap_or_else(|e| {
        log::error!("server exited: {e}");
        std::process::exit(1);
    });
}
