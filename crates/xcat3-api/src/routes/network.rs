//! `/v1/network` CRUD (§6). Any mutation broadcasts `restart_dhcp` to
//! every live network service (§4.9) — the store only touches the row.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use xcat3_common::error::NotFoundKind;
use xcat3_common::Error;
use xcat3_db::{Network, Store};

use crate::dto::NetworkCreate;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NetworksResponse {
    pub networks: Vec<Network>,
}

/// `GET /v1/network`.
pub async fn list_networks(State(state): State<AppState>) -> ApiResult<Json<NetworksResponse>> {
    let networks = state.store.list_networks().await?;
    Ok(Json(NetworksResponse { networks }))
}

/// `GET /v1/network/<name>`.
pub async fn get_network(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<Network>> {
    let network = state
        .store
        .get_network_by_name(&name)
        .await?
        .ok_or_else(|| Error::not_found(NotFoundKind::Network(name)))?;
    Ok(Json(network))
}

/// `POST /v1/network`: creates the row, then broadcasts `restart_dhcp`
/// so every DHCP daemon in the cluster picks up the new subnet (§4.9).
pub async fn create_network(State(state): State<AppState>, Json(body): Json<NetworkCreate>) -> ApiResult<(StatusCode, Json<Network>)> {
    let network = state.store.save_network(body.into_network()).await?;
    state.network_client.broadcast_restart().await?;
    Ok((StatusCode::CREATED, Json(network)))
}

/// `DELETE /v1/network/<name>`.
pub async fn destroy_network(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    state.store.destroy_network(&name).await?;
    state.network_client.broadcast_restart().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
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
            rpc_timeout: std::time::Duration::from_secs(5),
            heartbeat_timeout_secs: 60,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_get_network_round_trips() {
        let state = state();
        let body = NetworkCreate {
            name: "net1".to_string(),
            subnet: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: None,
            nameservers: vec![],
            ntpservers: vec![],
            domain: None,
            dynamic_range: None,
            extra: serde_json::Value::Null,
        };
        let (status, Json(created)) = create_network(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(fetched) = get_network(State(state), Path(created.name.clone())).await.unwrap();
        assert_eq!(fetched.subnet, "10.0.0.0");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_unknown_network_is_not_found() {
        let err = get_network(State(state()), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 404);
    }
}
