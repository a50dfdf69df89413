//! `/v1/nodes*` handlers (§6). CRUD plus power/boot-device/provision
//! fan out over [`xcat3_conductor::BulkDispatcher`]; the callback is
//! the one single-node, affinity-routed exception (§4.7).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use xcat3_common::error::{ConflictKind, NotFoundKind, Outcome};
use xcat3_common::states::{BootDevice, PowerTarget, ProvisionTarget, ServiceKind};
use xcat3_common::{Error, Result as CoreResult};
use xcat3_db::{ControlInfo, Node, Service, Store};
use xcat3_rpc::{topic_for, RpcEnvelope};

use crate::dto::{NodeCreate, NodeDetail};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NodeRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NamesBody {
    pub nodes: Vec<NodeRef>,
}

impl NamesBody {
    fn names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct NamesResponse {
    pub nodes: HashMap<String, String>,
}

fn outcomes_response(outcomes: HashMap<String, Outcome>) -> Json<NamesResponse> {
    Json(NamesResponse {
        nodes: outcomes.into_iter().map(|(k, v)| (k, v.as_wire_string())).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct NodesCreateBody {
    pub nodes: Vec<NodeCreate>,
}

/// `POST /v1/nodes` (§6): batch-size branching lives in `Store::create_nodes`
/// itself (§6 boundary behavior), this handler only shapes the response.
pub async fn create_nodes(State(state): State<AppState>, Json(body): Json<NodesCreateBody>) -> ApiResult<(StatusCode, Json<NamesResponse>)> {
    let nodes: Vec<Node> = body.nodes.into_iter().map(NodeCreate::into_node).collect();
    let results = state.store.create_nodes(nodes).await?;
    let out = results
        .into_iter()
        .map(|(name, result)| {
            let detail = match result {
                Ok(()) => "ok".to_string(),
                Err(e) => e.to_string(),
            };
            (name, detail)
        })
        .collect();
    Ok((StatusCode::CREATED, Json(NamesResponse { nodes: out })))
}

/// `DELETE /v1/nodes` (§6): a node in `DEPLOY_NODESET` is refused by
/// `Store::destroy_nodes` itself (§9 resolved ambiguity); this handler
/// routes the refusal through the conductor so the same code path
/// serves both the direct-object-layer case and a future conductor-side
/// pre-destroy hook.
pub async fn destroy_nodes(State(state): State<AppState>, Json(body): Json<NamesBody>) -> ApiResult<(StatusCode, Json<NamesResponse>)> {
    let names = body.names();
    let outcomes = state.dispatcher.dispatch(&names, "destroy_nodes", Map::new(), state.rpc_timeout).await?;
    Ok((StatusCode::ACCEPTED, outcomes_response(outcomes)))
}

#[derive(Debug, Serialize)]
pub struct NodeNamesResponse {
    pub nodes: Vec<String>,
}

/// `GET /v1/nodes` (§6).
pub async fn list_nodes(State(state): State<AppState>) -> ApiResult<Json<NodeNamesResponse>> {
    let names = state.store.list_node_names().await?;
    Ok(Json(NodeNamesResponse { nodes: names }))
}

/// `GET /v1/nodes/<name>` (§6).
pub async fn get_node(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<NodeDetail>> {
    let nodes = state.store.list_in(std::slice::from_ref(&name), true).await?;
    let node = nodes.first().ok_or_else(|| Error::not_found(NotFoundKind::Node(name)))?;
    Ok(Json(NodeDetail::from(node)))
}

#[derive(Debug, Serialize)]
pub struct NodeDetailsResponse {
    pub nodes: Vec<NodeDetail>,
}

/// `GET /v1/nodes/info` (§6): the batch form of `get_node`.
pub async fn node_info(State(state): State<AppState>, Json(body): Json<NamesBody>) -> ApiResult<Json<NodeDetailsResponse>> {
    let names = body.names();
    let nodes = state.store.list_in(&names, true).await?;
    Ok(Json(NodeDetailsResponse {
        nodes: nodes.iter().map(NodeDetail::from).collect(),
    }))
}

/// Fields a JSON-Patch op is allowed to target (§6 `PATCH /v1/nodes`).
/// Identity (`name`), reservation state and nics are not patchable
/// through this surface — reservation only changes through the task
/// manager, nics through `/v1/nics`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PatchableNode {
    #[serde(rename = "type")]
    node_type: String,
    arch: String,
    mgt: String,
    netboot: String,
    control_info: ControlInfo,
    console_info: Option<serde_json::Value>,
    task_action: Option<String>,
}

impl From<&Node> for PatchableNode {
    fn from(n: &Node) -> Self {
        PatchableNode {
            node_type: n.node_type.clone(),
            arch: n.arch.clone(),
            mgt: n.mgt.clone(),
            netboot: n.netboot.clone(),
            control_info: n.control_info.clone(),
            console_info: n.console_info.clone(),
            task_action: n.task_action.clone(),
        }
    }
}

fn apply_patchable(node: &mut Node, before: &PatchableNode, after: PatchableNode) {
    if after.node_type != before.node_type {
        node.set_node_type(after.node_type);
    }
    if after.arch != before.arch {
        node.set_arch(after.arch);
    }
    if after.mgt != before.mgt {
        node.set_mgt(after.mgt);
    }
    if after.netboot != before.netboot {
        node.set_netboot(after.netboot);
    }
    if after.control_info != before.control_info {
        node.set_control_info(after.control_info);
    }
    if after.console_info != before.console_info {
        node.set_console_info(after.console_info);
    }
    if after.task_action != before.task_action {
        node.set_task_action(after.task_action);
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchBody {
    pub nodes: Vec<NodeRef>,
    pub patches: Vec<Value>,
}

/// `PATCH /v1/nodes` (§6): one shared RFC6902 patch list applied
/// independently to each named node's patchable-field projection.
pub async fn patch_nodes(State(state): State<AppState>, Json(body): Json<PatchBody>) -> ApiResult<Json<NamesResponse>> {
    let names: Vec<String> = body.nodes.iter().map(|n| n.name.clone()).collect();
    let patch: json_patch::Patch = serde_json::from_value(Value::Array(body.patches))
        .map_err(|e| Error::InvalidParameterValue(format!("malformed JSON-Patch: {e}")))?;

    let mut nodes = state.store.list_in(&names, false).await?;
    let found: std::collections::HashSet<&String> = nodes.iter().map(|n| &n.name).collect();

    let mut out = HashMap::new();
    for name in &names {
        if !found.contains(name) {
            out.insert(name.clone(), Error::not_found(NotFoundKind::Node(name.clone())).to_string());
        }
    }

    for node in nodes.iter_mut() {
        let before = PatchableNode::from(&*node);
        let mut value = serde_json::to_value(&before).expect("PatchableNode always serializes");
        match json_patch::patch(&mut value, &patch) {
            Ok(()) => {}
            Err(e) => {
                out.insert(node.name.clone(), format!("invalid patch: {e}"));
                continue;
            }
        }
        let after: PatchableNode = match serde_json::from_value(value) {
            Ok(v) => v,
            Err(e) => {
                out.insert(node.name.clone(), format!("patch produced an invalid node: {e}"));
                continue;
            }
        };
        apply_patchable(node, &before, after);
        out.insert(node.name.clone(), "updated".to_string());
    }

    let to_save: Vec<Node> = nodes.into_iter().filter(|n| n.is_changed()).collect();
    if !to_save.is_empty() {
        state.store.save_nodes(&to_save).await?;
    }
    Ok(Json(NamesResponse { nodes: out }))
}

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target: String,
}

/// `PUT /v1/nodes/power` (§6).
pub async fn put_power(State(state): State<AppState>, Query(q): Query<TargetQuery>, Json(body): Json<NamesBody>) -> ApiResult<(StatusCode, Json<NamesResponse>)> {
    PowerTarget::parse(&q.target).ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
    let names = body.names();
    let mut kwargs = Map::new();
    kwargs.insert("target".to_string(), json!(q.target));
    let outcomes = state.dispatcher.dispatch(&names, "change_power_state", kwargs, state.rpc_timeout).await?;
    Ok((StatusCode::ACCEPTED, outcomes_response(outcomes)))
}

/// `GET /v1/nodes/power` (§6).
pub async fn get_power(State(state): State<AppState>, Json(body): Json<NamesBody>) -> ApiResult<Json<NamesResponse>> {
    let names = body.names();
    let outcomes = state.dispatcher.dispatch(&names, "get_power_state", Map::new(), state.rpc_timeout).await?;
    Ok(outcomes_response(outcomes))
}

/// `PUT /v1/nodes/boot_device` (§6).
pub async fn put_boot_device(State(state): State<AppState>, Query(q): Query<TargetQuery>, Json(body): Json<NamesBody>) -> ApiResult<(StatusCode, Json<NamesResponse>)> {
    BootDevice::parse(&q.target).ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
    let names = body.names();
    let mut kwargs = Map::new();
    kwargs.insert("target".to_string(), json!(q.target));
    let outcomes = state.dispatcher.dispatch(&names, "set_boot_device", kwargs, state.rpc_timeout).await?;
    Ok((StatusCode::ACCEPTED, outcomes_response(outcomes)))
}

/// `GET /v1/nodes/boot_device` (§6).
pub async fn get_boot_device(State(state): State<AppState>, Json(body): Json<NamesBody>) -> ApiResult<Json<NamesResponse>> {
    let names = body.names();
    let outcomes = state.dispatcher.dispatch(&names, "get_boot_device", Map::new(), state.rpc_timeout).await?;
    Ok(outcomes_response(outcomes))
}

#[derive(Debug, Deserialize)]
pub struct ProvisionQuery {
    pub target: String,
    pub osimage: Option<String>,
    pub subnet: Option<String>,
    pub passwd: Option<String>,
}

/// `PUT /v1/nodes/provision` (§6/§4.7). `un_dhcp`/`un_nodeset` are the
/// teardown targets (§4.7's `clean`); §4.7 requires their routing to be
/// affinity-based ("a node's cleanup runs on the conductor that
/// prepared it"), so those two targets bypass the weight-sharded
/// dispatcher and go through [`BulkDispatcher::dispatch_by_affinity`]
/// instead, addressed to the `clean` RPC method directly.
pub async fn put_provision(State(state): State<AppState>, Query(q): Query<ProvisionQuery>, Json(body): Json<NamesBody>) -> ApiResult<(StatusCode, Json<NamesResponse>)> {
    let target = ProvisionTarget::parse(&q.target).ok_or_else(|| Error::InvalidParameterValue("target".to_string()))?;
    let names = body.names();

    if target.is_undo() {
        let nodes = state.store.list_in(&names, false).await?;
        let found: std::collections::HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        let mut outcomes = state.dispatcher.dispatch_by_affinity(&nodes, "clean", Map::new(), state.rpc_timeout).await?;
        for name in &names {
            if !found.contains(name.as_str()) {
                outcomes.insert(name.clone(), Outcome::NotFound);
            }
        }
        return Ok((StatusCode::ACCEPTED, outcomes_response(outcomes)));
    }

    let mut kwargs = Map::new();
    kwargs.insert("target".to_string(), json!(q.target));
    if let Some(v) = &q.osimage {
        kwargs.insert("osimage".to_string(), json!(v));
    }
    if let Some(v) = &q.subnet {
        kwargs.insert("subnet".to_string(), json!(v));
    }
    if let Some(v) = &q.passwd {
        kwargs.insert("passwd".to_string(), json!(v));
    }
    let outcomes = state.dispatcher.dispatch(&names, "provision", kwargs, state.rpc_timeout).await?;
    Ok((StatusCode::ACCEPTED, outcomes_response(outcomes)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub name: String,
}

/// Picks which conductor answers a `provision_callback` RPC (§4.7):
/// the node's `conductor_affinity` if it has one, else — only valid for
/// the `fetch_ssh_pub` sub-request, which doesn't touch node state at
/// all — any live conductor.
async fn route_callback(state: &AppState, node: &Node, fetch_ssh_pub: bool) -> CoreResult<Service> {
    if let Some(id) = node.conductor_affinity {
        if let Some(svc) = state.store.find_service_by_id(id).await? {
            return Ok(svc);
        }
        return Err(Error::not_found(NotFoundKind::Service(format!("conductor {id} could not be found"))));
    }
    if !fetch_ssh_pub {
        return Err(Error::conflict(ConflictKind::DeployStateFailure(format!(
            "node {} has no conductor_affinity at callback time",
            node.name
        ))));
    }
    let live = state.store.live_services(ServiceKind::Conductor, state.heartbeat_timeout_secs).await?;
    live.into_iter().next().ok_or_else(|| Error::not_found(NotFoundKind::NoValidHost))
}

/// `PUT /v1/nodes/provision/callback?name=<n>` (§6/§4.7): routed by
/// affinity, not sharded by the bulk dispatcher — there is exactly one
/// node and exactly one conductor that can answer for it.
pub async fn provision_callback(State(state): State<AppState>, Query(q): Query<CallbackQuery>, body: Option<Json<Value>>) -> ApiResult<Json<Value>> {
    let nodes = state.store.list_in(std::slice::from_ref(&q.name), false).await?;
    let node = nodes.first().ok_or_else(|| Error::not_found(NotFoundKind::Node(q.name.clone())))?;
    let action = body.map(|Json(v)| v);
    let fetch_ssh_pub = action.as_ref().map(|a| a.get("fetch_ssh_pub").is_some()).unwrap_or(false);

    let svc = route_callback(&state, node, fetch_ssh_pub).await?;
    let topic = topic_for(ServiceKind::Conductor, &svc.hostname);
    let mut kwargs = Map::new();
    kwargs.insert("name".to_string(), json!(q.name));
    if let Some(action) = action {
        kwargs.insert("action".to_string(), action);
    }
    let envelope = RpcEnvelope::new("provision_callback", Value::Object(kwargs));
    let result = state.transport.call(&svc.hostname, &topic, envelope).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xcat3_conductor::{BulkDispatcher, NetworkClient};
    use xcat3_db::{FakeStore, Store};
    use xcat3_rpc::InProcessTransport;

    fn state() -> AppState {
        let store: std::sync::Arc<dyn xcat3_db::Store> = std::sync::Arc::new(FakeStore::new());
        let transport = std::sync::Arc::new(InProcessTransport::new());
        AppState {
            store: store.clone(),
            dispatcher: std::sync::Arc::new(BulkDispatcher::new(store.clone(), transport.clone(), 60, 8)),
            network_client: std::sync::Arc::new(NetworkClient::new(store.clone(), transport.clone(), 60)),
            transport,
            rpc_timeout: Duration::from_secs(5),
            heartbeat_timeout_secs: 60,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_get_node_round_trips() {
        let state = state();
        let body = NodesCreateBody {
            nodes: vec![NodeCreate {
                name: "n1".to_string(),
                mgt: "ipmi".to_string(),
                netboot: "pxe".to_string(),
                arch: "x86_64".to_string(),
                node_type: String::new(),
                control_info: ControlInfo::Unknown(Value::Null),
                console_info: None,
                nics_info: Default::default(),
            }],
        };
        let (status, Json(resp)) = create_nodes(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(resp.nodes["n1"], "ok");

        let Json(detail) = get_node(State(state), Path("n1".to_string())).await.unwrap();
        assert_eq!(detail.name, "n1");
        assert_eq!(detail.mgt, "ipmi");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_node_missing_is_not_found() {
        let err = get_node(State(state()), Path("ghost".to_string())).await.unwrap_err();
        assert_eq!(err.0.http_status(), 404);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_power_rejects_unknown_target() {
        let body = NamesBody { nodes: vec![NodeRef { name: "n1".to_string() }] };
        let err = put_power(State(state()), Query(TargetQuery { target: "sideways".to_string() }), Json(body)).await.unwrap_err();
        assert_eq!(err.0.http_status(), 400);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patch_nodes_applies_rfc6902_ops_to_patchable_fields() {
        let state = state();
        state.store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();

        let body = PatchBody {
            nodes: vec![NodeRef { name: "n1".to_string() }],
            patches: vec![json!({"op": "replace", "path": "/arch", "value": "ppc64le"})],
        };
        let Json(resp) = patch_nodes(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(resp.nodes["n1"], "updated");

        let nodes = state.store.list_in(&["n1".to_string()], false).await.unwrap();
        assert_eq!(nodes[0].arch, "ppc64le");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patch_nodes_reports_missing_names_without_failing_the_batch() {
        let state = state();
        state.store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();

        let body = PatchBody {
            nodes: vec![NodeRef { name: "n1".to_string() }, NodeRef { name: "ghost".to_string() }],
            patches: vec![json!({"op": "replace", "path": "/arch", "value": "ppc64le"})],
        };
        let Json(resp) = patch_nodes(State(state), Json(body)).await.unwrap();
        assert_eq!(resp.nodes["n1"], "updated");
        assert!(resp.nodes["ghost"].contains("could not be found"), "got: {}", resp.nodes["ghost"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn provision_callback_without_affinity_or_fetch_ssh_pub_is_a_conflict() {
        let state = state();
        state.store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();

        let err = provision_callback(State(state), Query(CallbackQuery { name: "n1".to_string() }), None).await.unwrap_err();
        assert_eq!(err.0.http_status(), 409);
    }

    /// §4.7's teardown routing rule ("a node's cleanup runs on the
    /// conductor that prepared it") means `un_dhcp`/`un_nodeset` never
    /// fall back to weight-sharded dispatch: a node with no recorded
    /// affinity is reported as an error row rather than sent anywhere.
    #[tokio::test(flavor = "multi_thread")]
    async fn un_nodeset_on_a_node_with_no_affinity_is_reported_not_dispatched() {
        let state = state();
        state.store.create_nodes(vec![Node::new("n1", "ipmi", "pxe")]).await.unwrap();

        let body = NamesBody { nodes: vec![NodeRef { name: "n1".to_string() }] };
        let (status, Json(resp)) = put_provision(
            State(state),
            Query(ProvisionQuery { target: "un_nodeset".to_string(), osimage: None, subnet: None, passwd: None }),
            Json(body),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(resp.nodes["n1"].contains("could not be found"), "got: {}", resp.nodes["n1"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn un_dhcp_on_an_unknown_node_name_is_not_found() {
        let state = state();
        let body = NamesBody { nodes: vec![NodeRef { name: "ghost".to_string() }] };
        let (_, Json(resp)) = put_provision(
            State(state),
            Query(ProvisionQuery { target: "un_dhcp".to_string(), osimage: None, subnet: None, passwd: None }),
            Json(body),
        )
        .await
        .unwrap();
        assert!(resp.nodes["ghost"].contains("not be found"), "got: {}", resp.nodes["ghost"]);
    }
}
