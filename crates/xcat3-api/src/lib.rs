//! The public HTTP surface (§6): every `/v1/*` route from
//! `routes::*`, composed behind the version-negotiation middleware.

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
pub mod version;

use axum::routing::{get, put};
use axum::{middleware, Router};

use routes::{network, nics, nodes, osimages, passwd};
use state::AppState;

/// Builds the full router for a given [`AppState`]; split out of the
/// binary so the seed end-to-end tests (§8a) can mount it over an
/// in-memory store without going through `main`.
pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/nodes", get(nodes::list_nodes).post(nodes::create_nodes).delete(nodes::destroy_nodes).patch(nodes::patch_nodes))
        .route("/nodes/info", get(nodes::node_info))
        .route("/nodes/power", get(nodes::get_power).put(nodes::put_power))
        .route("/nodes/boot_device", get(nodes::get_boot_device).put(nodes::put_boot_device))
        .route("/nodes/provision", put(nodes::put_provision))
        .route("/nodes/provision/callback", put(nodes::provision_callback))
        .route("/nodes/{name}", get(nodes::get_node))
        .route("/network", get(network::list_networks).post(network::create_network))
        .route("/network/{name}", get(network::get_network).delete(network::destroy_network))
        .route("/osimages", get(osimages::list_osimages).post(osimages::create_osimage))
        .route("/osimages/{name}", get(osimages::get_osimage).delete(osimages::destroy_osimage))
        .route("/nics", get(nics::list_nics).post(nics::create_nic))
        .route("/nics/{uuid}", get(nics::get_nic).delete(nics::destroy_nic))
        .route("/passwd", get(passwd::list_passwds).post(passwd::create_passwd))
        .route("/passwd/{key}", get(passwd::get_passwd).delete(passwd::destroy_passwd))
        .route_layer(middleware::from_fn(version::negotiate));

    Router::new().nest("/v1", v1).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use xcat3_conductor::{BulkDispatcher, NetworkClient};
    use xcat3_db::{FakeStore, Store};
    use xcat3_rpc::InProcessTransport;

    fn state() -> AppState {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let transport = Arc::new(InProcessTransport::new());
        AppState {
            store: store.clone(),
            dispatcher: Arc::new(BulkDispatcher::new(store.clone(), transport.clone(), 60, 8)),
            network_client: Arc::new(NetworkClient::new(store.clone(), transport.clone(), 60)),
            transport,
            rpc_timeout: Duration::from_secs(5),
            heartbeat_timeout_secs: 60,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_nodes_on_empty_store_returns_empty_array() {
        let app = build_router(state());
        let response = app
            .oneshot(Request::builder().uri("/v1/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mismatched_major_version_is_rejected() {
        let app = build_router(state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/nodes")
                    .header("X-xCAT3-API-Version", "2.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_node_returns_404() {
        let app = build_router(state());
        let response = app
            .oneshot(Request::builder().uri("/v1/nodes/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
