//! `/v1/passwd` CRUD (§6, §4.8). Passwords are crypted in
//! `PasswdCreate::into_passwd` before ever reaching the store, so the
//! persisted row and every response here already carry the crypted
//! form — the cleartext never survives past request deserialization.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use xcat3_common::error::NotFoundKind;
use xcat3_common::Error;
use xcat3_db::{Passwd, Store};

use crate::dto::PasswdCreate;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PasswdsResponse {
    pub passwds: Vec<Passwd>,
}

/// `GET /v1/passwd`.
pub async fn list_passwds(State(state): State<AppState>) -> ApiResult<Json<PasswdsResponse>> {
    let passwds = state.store.list_passwds().await?;
    Ok(Json(PasswdsResponse { passwds }))
}

/// `GET /v1/passwd/<key>`.
pub async fn get_passwd(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Json<Passwd>> {
    let passwd = state.store.get_passwd(&key).await?.ok_or_else(|| Error::not_found(NotFoundKind::Passwd(key)))?;
    Ok(Json(passwd))
}

/// `POST /v1/passwd`.
pub async fn create_passwd(State(state): State<AppState>, Json(body): Json<PasswdCreate>) -> ApiResult<(StatusCode, Json<Passwd>)> {
    let passwd = state.store.save_passwd(body.into_passwd()).await?;
    Ok((StatusCode::CREATED, Json(passwd)))
}

/// `DELETE /v1/passwd/<key>`.
pub async fn destroy_passwd(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<StatusCode> {
    state.store.destroy_passwd(&key).await?;
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
    async fn create_passwd_stores_crypted_form_not_cleartext() {
        let state = state();
        let body = PasswdCreate {
            key: "root".to_string(),
            username: "root".to_string(),
            password: "hunter2".to_string(),
            crypt_method: None,
        };
        let (status, Json(created)) = create_passwd(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(created.password, "hunter2");

        let Json(fetched) = get_passwd(State(state.clone()), Path(created.key.clone())).await.unwrap();
        assert_eq!(fetched.password, created.password);

        destroy_passwd(State(state), Path(created.key)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_unknown_passwd_is_not_found() {
        let err = get_passwd(State(state()), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 404);
    }
}
