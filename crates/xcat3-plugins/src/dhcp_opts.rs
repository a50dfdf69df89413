//! Per-node DHCP option set a boot plugin contributes (§4.10), grounded
//! on the dict `pxe.py`'s and `petitboot.py`'s `gen_dhcp_opts` build
//! (`mac`, `ip`, `hostname`, option 66/12/15/67/209). Typed here instead
//! of kept as a loose map, since `xcat3-network`'s renderer matches on
//! specific fields rather than walking an untyped dict.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOpts {
    pub mac: String,
    pub ip: Option<String>,
    pub hostname: String,
    /// Option 66 (next-server/tftp host): the conductor's own host IP.
    pub next_server: String,
    /// Option 12/15: the node name, sent for both.
    pub node_name: String,
    /// Option 67, conditional on the client's vendor-class-id
    /// (`vendor-class-identifier`); `None` when the boot plugin doesn't
    /// render a conditional boot filename (petitboot serves one fixed
    /// URL via option 209 instead).
    pub vendor_class_boot_file: Option<HashMap<String, String>>,
    /// Option 209 (petitboot's own config-url extension).
    pub petitboot_config_url: Option<String>,
}

impl DhcpOpts {
    pub fn new(mac: impl Into<String>, ip: Option<String>, hostname: impl Into<String>, next_server: impl Into<String>) -> Self {
        let hostname = hostname.into();
        Self {
            mac: mac.into(),
            ip,
            hostname: hostname.clone(),
            next_server: next_server.into(),
            node_name: hostname,
            vendor_class_boot_file: None,
            petitboot_config_url: None,
        }
    }

    /// `ISCDHCPService._build_supersede` + its `dhcp_node.template` host
    /// block, folded into one render since nothing else consumes the
    /// intermediate statement list. Returns `(statements, content)`
    /// ready to drop straight into a [`xcat3_db::DhcpBlob`].
    pub fn render(&self) -> (String, String) {
        let mut statements = Vec::new();

        if let Some(by_vendor) = &self.vendor_class_boot_file {
            let mut cond = String::new();
            let mut first = true;
            for (vendor, file) in by_vendor {
                if vendor == "other" {
                    continue;
                }
                if first {
                    cond.push_str(&format!(
                        "if option vendor-class-identifier = \"{vendor}\" \t{{\n  \tsupersede server.filename = \"{file}\";\n\t}}"
                    ));
                    first = false;
                } else {
                    cond.push_str(&format!(
                        "\telse if option vendor-class-identifier = \"{vendor}\" \t{{\n  \tsupersede server.filename = \"{file}\";\n\t}} "
                    ));
                }
            }
            if let Some(other) = by_vendor.get("other") {
                cond.push_str(&format!(" else {{ \n\t  supersede server.filename = \"{other}\";\n\t}} "));
            }
            statements.push(cond);
        } else if let Some(url) = &self.petitboot_config_url {
            statements.push(format!("\tsupersede option-209 = \"{url}\";"));
        }

        statements.push(format!("\tsupersede server.server-name = \"{}\";", self.next_server));
        statements.push(format!("\tsupersede server.next-server {};", self.next_server));
        statements.push(format!("\tsupersede host-name = \"{}\";", self.node_name));
        statements.push(format!("\tsupersede server.ddns-hostname = \"{}\";", self.node_name));

        let statements = statements.join("\n");
        let fixed_address = self.ip.as_deref().map(|ip| format!("\tfixed-address {ip};\n")).unwrap_or_default();
        let content = format!("host {} {{\n\thardware ethernet {};\n{fixed_address}{statements}\n}}\n", self.hostname, self.mac);

        (statements, content)
    }
}
