//! `/v1/osimages` CRUD (§6, §3 "destroyed only if no Node references
//! it").

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use xcat3_common::error::{ConflictKind, NotFoundKind};
use xcat3_common::Error;
use xcat3_db::{OsImage, Store};

use crate::dto::OsImageCreate;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OsImagesResponse {
    pub osimages: Vec<OsImage>,
}

/// `GET /v1/osimages`.
pub async fn list_osimages(State(state): State<AppState>) -> ApiResult<Json<OsImagesResponse>> {
    let osimages = state.store.list_osimages().await?;
    Ok(Json(OsImagesResponse { osimages }))
}

/// `GET /v1/osimages/<name>`.
pub async fn get_osimage(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<OsImage>> {
    let image = state
        .store
        .find_osimage_by_name(&name)
        .await?
        .ok_or_else(|| Error::not_found(NotFoundKind::OsImage(name)))?;
    Ok(Json(image))
}

/// `POST /v1/osimages`.
pub async fn create_osimage(State(state): State<AppState>, Json(body): Json<OsImageCreate>) -> ApiResult<(StatusCode, Json<OsImage>)> {
    let image = state.store.save_osimage(body.into_osimage()).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

/// `DELETE /v1/osimages/<name>`: refused while a node still references
/// the image (§3 lifecycle), the same invariant `destroy_osimage` on
/// `ConductorManager` enforces for the conductor path.
pub async fn destroy_osimage(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<StatusCode> {
    let image = state
        .store
        .find_osimage_by_name(&name)
        .await?
        .ok_or_else(|| Error::not_found(NotFoundKind::OsImage(name.clone())))?;
    let id = image.id.ok_or_else(|| Error::not_found(NotFoundKind::OsImage(name.clone())))?;
    let count = state.store.count_nodes_with_osimage(id).await?;
    if count > 0 {
        return Err(Error::conflict(ConflictKind::InvalidState(format!(
            "osimage {name} is still referenced by {count} node(s)"
        )))
        .into());
    }
    state.store.destroy_osimage(&name).await?;
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

    fn body() -> OsImageCreate {
        OsImageCreate {
            name: "centos-7.3-x86_64".to_string(),
            distro: "centos".to_string(),
            ver: "7.3".to_string(),
            arch: "x86_64".to_string(),
            orig_name: "centos-7.3.iso".to_string(),
            profile: None,
            image_type: None,
            provmethod: None,
            rootfstype: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_destroy_osimage_round_trips() {
        let state = state();
        let (status, Json(created)) = create_osimage(State(state.clone()), Json(body())).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(fetched) = get_osimage(State(state.clone()), Path(created.name.clone())).await.unwrap();
        assert_eq!(fetched.distro, "centos");

        destroy_osimage(State(state), Path(created.name)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn destroy_osimage_still_referenced_by_a_node_is_a_conflict() {
        let state = state();
        let (_, Json(created)) = create_osimage(State(state.clone()), Json(body())).await.unwrap();

        let mut node = xcat3_db::Node::new("node1", "ipmi", "pxe");
        node.osimage_id = created.id;
        state.store.create_nodes(vec![node]).await.unwrap();

        let err = destroy_osimage(State(state), Path(created.name)).await.unwrap_err();
        assert_eq!(err.0.http_status(), 409);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_unknown_osimage_is_not_found() {
        let err = get_osimage(State(state()), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 404);
    }
}
