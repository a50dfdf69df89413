//! `/v1/nics` CRUD (§6). Nics are addressed by `uuid`, not by the owning
//! node's name — the same identity `xcat3_db::Nic` uses internally.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use xcat3_common::error::NotFoundKind;
use xcat3_common::Error;
use xcat3_db::{Nic, Store};

use crate::dto::NicCreate;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NicsResponse {
    pub nics: Vec<Nic>,
}

/// `GET /v1/nics`.
pub async fn list_nics(State(state): State<AppState>) -> ApiResult<Json<NicsResponse>> {
    let nics = state.store.list_nics().await?;
    Ok(Json(NicsResponse { nics }))
}

/// `GET /v1/nics/<uuid>`.
pub async fn get_nic(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<Json<Nic>> {
    let nic = state.store.get_nic(&uuid).await?.ok_or_else(|| Error::not_found(NotFoundKind::Nic(uuid)))?;
    Ok(Json(nic))
}

/// `POST /v1/nics`.
pub async fn create_nic(State(state): State<AppState>, Json(body): Json<NicCreate>) -> ApiResult<(StatusCode, Json<Nic>)> {
    let nic = state.store.create_nic(body.into_nic()).await?;
    Ok((StatusCode::CREATED, Json(nic)))
}

/// `DELETE /v1/nics/<uuid>`.
pub async fn destroy_nic(State(state): State<AppState>, Path(uuid): Path<String>) -> ApiResult<StatusCode> {
    state.store.destroy_nic(&uuid).await?;
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
    async fn create_then_get_nic_round_trips() {
        let state = state();
        let body = NicCreate {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
            name: None,
            ip: None,
            netmask: None,
            primary: false,
            extra: serde_json::Value::Null,
        };
        let (status, Json(created)) = create_nic(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.mac, "aa:bb:cc:dd:ee:ff");

        let Json(fetched) = get_nic(State(state.clone()), Path(created.uuid.clone())).await.unwrap();
        assert_eq!(fetched.mac, "aa:bb:cc:dd:ee:ff");

        destroy_nic(State(state), Path(created.uuid)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_unknown_nic_is_not_found() {
        let err = get_nic(State(state()), Path("ghost-uuid".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 404);
    }
}
