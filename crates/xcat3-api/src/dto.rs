//! Wire-shape DTOs for the `/v1` resources. `xcat3_db`'s records carry
//! internal-only fields (`changed: HashSet<&'static str>`) that aren't
//! meaningfully serializable, so the HTTP surface gets its own request/
//! response structs and converts explicitly at the boundary — the same
//! separation §9's "exceptions as outcome channel" note draws between
//! internal and wire representations.

use serde::{Deserialize, Serialize};

use xcat3_db::{ControlInfo, Network, Nic, Node, OsImage, Passwd};

#[derive(Debug, Deserialize)]
pub struct NicCreate {
    pub mac: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub netmask: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl NicCreate {
    pub fn into_nic(self) -> Nic {
        let mut nic = Nic::new(self.mac);
        nic.name = self.name;
        nic.ip = self.ip;
        nic.netmask = self.netmask;
        nic.primary = self.primary;
        nic.extra = self.extra;
        nic
    }
}

#[derive(Debug, Deserialize)]
pub struct NicsInfo {
    #[serde(default)]
    pub nics: Vec<NicCreate>,
}

#[derive(Debug, Deserialize)]
pub struct NodeCreate {
    pub name: String,
    pub mgt: String,
    pub netboot: String,
    #[serde(default)]
    pub arch: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default = "default_control_info")]
    pub control_info: ControlInfo,
    #[serde(default)]
    pub console_info: Option<serde_json::Value>,
    #[serde(default)]
    pub nics_info: NicsInfo,
}

fn default_control_info() -> ControlInfo {
    ControlInfo::Unknown(serde_json::Value::Null)
}

impl Default for NicsInfo {
    fn default() -> Self {
        NicsInfo { nics: Vec::new() }
    }
}

impl NodeCreate {
    pub fn into_node(self) -> Node {
        let mut node = Node::new(self.name, self.mgt, self.netboot);
        node.arch = self.arch;
        node.node_type = self.node_type;
        node.control_info = self.control_info;
        node.console_info = self.console_info;
        node.nics = self.nics_info.nics.into_iter().map(NicCreate::into_nic).collect();
        node
    }
}

#[derive(Debug, Serialize)]
pub struct NicDto {
    pub uuid: String,
    pub mac: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub primary: bool,
    pub extra: serde_json::Value,
}

impl From<&Nic> for NicDto {
    fn from(n: &Nic) -> Self {
        NicDto {
            uuid: n.uuid.clone(),
            mac: n.mac.clone(),
            name: n.name.clone(),
            ip: n.ip.clone(),
            netmask: n.netmask.clone(),
            primary: n.effective_primary(),
            extra: n.extra.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NodeDetail {
    pub name: String,
    pub mgt: String,
    pub netboot: String,
    pub arch: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub state: String,
    pub task_action: Option<String>,
    pub control_info: ControlInfo,
    pub console_info: Option<serde_json::Value>,
    pub reservation: Option<String>,
    pub conductor_affinity: Option<u64>,
    pub osimage_id: Option<u64>,
    pub passwd_id: Option<u64>,
    pub last_error: Option<String>,
    pub nics: Vec<NicDto>,
}

impl From<&Node> for NodeDetail {
    fn from(n: &Node) -> Self {
        NodeDetail {
            name: n.name.clone(),
            mgt: n.mgt.clone(),
            netboot: n.netboot.clone(),
            arch: n.arch.clone(),
            node_type: n.node_type.clone(),
            state: n.state.as_wire().to_string(),
            task_action: n.task_action.clone(),
            control_info: n.control_info.clone(),
            console_info: n.console_info.clone(),
            reservation: n.reservation.clone(),
            conductor_affinity: n.conductor_affinity,
            osimage_id: n.osimage_id,
            passwd_id: n.passwd_id,
            last_error: n.last_error.clone(),
            nics: n.nics.iter().map(NicDto::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkCreate {
    pub name: String,
    pub subnet: String,
    pub netmask: String,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub nameservers: Vec<String>,
    #[serde(default)]
    pub ntpservers: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub dynamic_range: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl NetworkCreate {
    pub fn into_network(self) -> Network {
        let mut network = Network::new(self.name, self.subnet, self.netmask);
        network.gateway = self.gateway;
        network.nameservers = self.nameservers;
        network.ntpservers = self.ntpservers;
        network.domain = self.domain;
        network.dynamic_range = self.dynamic_range;
        network.extra = self.extra;
        network
    }
}

#[derive(Debug, Deserialize)]
pub struct OsImageCreate {
    pub name: String,
    pub distro: String,
    pub ver: String,
    pub arch: String,
    pub orig_name: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(rename = "type", default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub provmethod: Option<String>,
    #[serde(default)]
    pub rootfstype: Option<String>,
}

impl OsImageCreate {
    pub fn into_osimage(self) -> OsImage {
        let mut img = OsImage::new(self.name, self.distro, self.ver, self.arch, self.orig_name);
        img.profile = self.profile;
        img.image_type = self.image_type;
        img.provmethod = self.provmethod;
        img.rootfstype = self.rootfstype;
        img
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswdCreate {
    pub key: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub crypt_method: Option<String>,
}

impl PasswdCreate {
    pub fn into_passwd(self) -> Passwd {
        let method = self.crypt_method.as_deref().and_then(xcat3_common::crypt::CryptMethod::parse);
        let crypted = xcat3_common::crypt::crypt_password(&self.password, method);
        let mut passwd = Passwd::new(self.key, self.username, crypted);
        passwd.crypt_method = method;
        passwd
    }
}
