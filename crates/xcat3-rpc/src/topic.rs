//! Topic naming (§4.4/§4.5/§4.9): `<base>.<hostname>`, where `base`
//! comes from `xcat3_common::states::ServiceKind::topic_base`
//! (`xcat3.conductor_manager`/`xcat3.network_manager`).

use xcat3_common::states::ServiceKind;

pub fn topic_for(kind: ServiceKind, hostname: &str) -> String {
    format!("{}.{hostname}", kind.topic_base())
}
