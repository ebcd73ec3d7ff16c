//! Command builders for the Huawei MA5800 CLI grammar.
//!
//! Every builder is a pure function: it validates its inputs and returns the
//! ordered command lines to run, or a `Validation` error before any I/O is
//! attempted. All resilience (retries, timeouts) lives in the session layer.

use regex_lite::Regex;
use std::sync::OnceLock;

use crate::error::{OltError, Result};
use crate::models::{AuthorizeRequest, OnuConfig};

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)/(\d+)/(\d+)$").expect("port regex"))
}

/// Validate a PON port in frame/slot/port form and split it into components.
pub fn split_port(port: &str) -> Result<(u32, u32, u32)> {
    let caps = port_regex()
        .captures(port)
        .ok_or_else(|| OltError::validation(format!("invalid port format: {port} (expected frame/slot/port)")))?;
    // Captures are all-digit by construction; component overflow is still an input error
    let parse = |i: usize| -> Result<u32> {
        caps[i]
            .parse()
            .map_err(|_| OltError::validation(format!("port component out of range: {port}")))
    };
    Ok((parse(1)?, parse(2)?, parse(3)?))
}

pub fn validate_vlan(vlan: u16) -> Result<()> {
    if (1..=4094).contains(&vlan) {
        Ok(())
    } else {
        Err(OltError::validation(format!("VLAN {vlan} out of range 1-4094")))
    }
}

pub fn validate_profile(name: &str, id: &str) -> Result<()> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(OltError::validation(format!("invalid {name} profile id: {id}")))
    }
}

pub fn validate_serial(serial: &str) -> Result<()> {
    if serial.trim().is_empty() {
        Err(OltError::validation("serial must not be empty"))
    } else {
        Ok(())
    }
}

/// Put the CLI session into config mode after login
pub fn enter_config_mode() -> Vec<String> {
    vec!["enable".to_string(), "config".to_string()]
}

pub fn system_info() -> Vec<String> {
    vec![
        "display version".to_string(),
        "display temperature".to_string(),
    ]
}

pub fn onu_list() -> Vec<String> {
    vec!["display ont info 0 all".to_string()]
}

pub fn unauthorized_onus() -> Vec<String> {
    vec!["display ont autofind all".to_string()]
}

/// Authorization sequence: enter the gpon interface, add the ONT by serial,
/// optionally pin its first ethernet port to a native VLAN, then leave.
pub fn authorize_onu(req: &AuthorizeRequest) -> Result<Vec<String>> {
    let (frame, slot, port) = split_port(&req.port)?;
    validate_serial(&req.serial)?;
    validate_profile("line", &req.line_profile)?;
    validate_profile("service", &req.srv_profile)?;
    if let Some(vlan) = req.native_vlan {
        validate_vlan(vlan)?;
    }

    let mut commands = vec![
        format!("interface gpon {frame}/{slot}"),
        format!(
            "ont add {port} sn-auth {} omci ont-lineprofile-id {} ont-srvprofile-id {} desc \"{}\"",
            req.serial, req.line_profile, req.srv_profile, req.description
        ),
    ];
    if let Some(vlan) = req.native_vlan {
        commands.push(format!("ont port native-vlan {port} 1 eth 1 vlan {vlan}"));
    }
    commands.push("quit".to_string());
    Ok(commands)
}

pub fn delete_onu(pon_port: &str, onu_id: u32) -> Result<Vec<String>> {
    let (frame, slot, port) = split_port(pon_port)?;
    Ok(vec![
        format!("interface gpon {frame}/{slot}"),
        format!("ont delete {port} {onu_id}"),
        "quit".to_string(),
    ])
}

pub fn configure_vlan(vlan: u16, description: &str, ports: &[String]) -> Result<Vec<String>> {
    validate_vlan(vlan)?;
    for port in ports {
        split_port(port)?;
    }

    let mut commands = vec![
        format!("vlan {vlan}"),
        format!("description {description}"),
        "quit".to_string(),
    ];
    for port in ports {
        commands.push(format!("service-port vlan {vlan} {port} user-vlan"));
    }
    Ok(commands)
}

pub fn start_onu(serial: &str) -> Result<Vec<String>> {
    validate_serial(serial)?;
    Ok(vec![format!("onu start {serial}")])
}

pub fn stop_onu(serial: &str) -> Result<Vec<String>> {
    validate_serial(serial)?;
    Ok(vec![format!("onu stop {serial}")])
}

pub fn reboot_onu(serial: &str) -> Result<Vec<String>> {
    validate_serial(serial)?;
    Ok(vec![format!("onu reboot {serial}")])
}

/// Per-ONU reconfiguration; only the supplied fields produce commands.
pub fn configure_onu(serial: &str, config: &OnuConfig) -> Result<Vec<String>> {
    validate_serial(serial)?;

    let mut commands = Vec::new();
    if let Some(ref line_profile) = config.line_profile {
        validate_profile("line", line_profile)?;
        commands.push(format!("onu line-profile {serial} {line_profile}"));
    }
    if let Some(ref srv_profile) = config.srv_profile {
        validate_profile("service", srv_profile)?;
        commands.push(format!("onu service-profile {serial} {srv_profile}"));
    }
    if let Some(vlan) = config.native_vlan {
        validate_vlan(vlan)?;
        commands.push(format!("onu vlan {serial} {vlan}"));
    }
    Ok(commands)
}

pub fn onu_status(serial: &str) -> Result<Vec<String>> {
    validate_serial(serial)?;
    Ok(vec![
        format!("show onu status {serial}"),
        format!("show onu optical-info {serial}"),
        format!("show onu port-config {serial}"),
    ])
}

pub fn configure_onu_port(serial: &str, port_name: &str, admin_state: &str, mode: &str, dhcp: &str) -> Result<Vec<String>> {
    validate_serial(serial)?;
    if !["Enabled", "Disabled"].contains(&admin_state) {
        return Err(OltError::validation(format!("invalid admin state: {admin_state}")));
    }
    if !["LAN", "WAN"].contains(&mode) {
        return Err(OltError::validation(format!("invalid port mode: {mode}")));
    }
    if !["No control", "Snooping", "Relay"].contains(&dhcp) {
        return Err(OltError::validation(format!("invalid dhcp mode: {dhcp}")));
    }
    Ok(vec![
        format!("onu port {serial} {port_name} admin-state {admin_state}"),
        format!("onu port {serial} {port_name} mode {mode}"),
        format!("onu port {serial} {port_name} dhcp {dhcp}"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_port() {
        assert_eq!(split_port("0/1/7").unwrap(), (0, 1, 7));
        assert!(split_port("17").is_err());
        assert!(split_port("0/1").is_err());
        assert!(split_port("0/1/7/2").is_err());
        assert!(split_port("a/b/c").is_err());
        assert!(split_port("").is_err());
    }

    #[test]
    fn test_validate_vlan() {
        assert!(validate_vlan(1).is_ok());
        assert!(validate_vlan(4094).is_ok());
        assert!(validate_vlan(0).is_err());
        assert!(validate_vlan(4095).is_err());
    }

    #[test]
    fn test_authorize_builds_full_sequence() {
        let req = AuthorizeRequest {
            port: "0/1/0".into(),
            serial: "HWTC12345678".into(),
            description: "apt 42".into(),
            line_profile: "1".into(),
            srv_profile: "2".into(),
            native_vlan: Some(100),
        };
        let cmds = authorize_onu(&req).unwrap();
        assert_eq!(cmds[0], "interface gpon 0/1");
        assert!(cmds[1].starts_with("ont add 0 sn-auth HWTC12345678"));
        assert!(cmds[1].contains("ont-lineprofile-id 1"));
        assert!(cmds[1].contains("ont-srvprofile-id 2"));
        assert!(cmds[1].contains("desc \"apt 42\""));
        assert_eq!(cmds[2], "ont port native-vlan 0 1 eth 1 vlan 100");
        assert_eq!(cmds.last().unwrap(), "quit");
    }

    #[test]
    fn test_authorize_rejects_bad_port_before_io() {
        let req = AuthorizeRequest {
            port: "17".into(),
            serial: "HWTC12345678".into(),
            description: String::new(),
            line_profile: "1".into(),
            srv_profile: "1".into(),
            native_vlan: None,
        };
        let err = authorize_onu(&req).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_authorize_rejects_bad_vlan_and_profile() {
        let mut req = AuthorizeRequest {
            port: "0/1/0".into(),
            serial: "HWTC12345678".into(),
            description: String::new(),
            line_profile: "one".into(),
            srv_profile: "1".into(),
            native_vlan: None,
        };
        assert_eq!(authorize_onu(&req).unwrap_err().kind(), "validation");

        req.line_profile = "1".into();
        req.native_vlan = Some(5000);
        assert_eq!(authorize_onu(&req).unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_configure_onu_only_emits_supplied_fields() {
        let config = OnuConfig {
            line_profile: None,
            srv_profile: Some("3".into()),
            native_vlan: Some(200),
        };
        let cmds = configure_onu("HWTC1", &config).unwrap();
        assert_eq!(cmds, vec![
            "onu service-profile HWTC1 3".to_string(),
            "onu vlan HWTC1 200".to_string(),
        ]);
    }

    #[test]
    fn test_start_requires_serial() {
        assert_eq!(start_onu("").unwrap_err().kind(), "validation");
        assert_eq!(start_onu("  ").unwrap_err().kind(), "validation");
        assert_eq!(start_onu("HWTC1").unwrap(), vec!["onu start HWTC1"]);
    }

    #[test]
    fn test_configure_onu_port_validates_modes() {
        assert!(configure_onu_port("HWTC1", "eth_0/1", "Enabled", "LAN", "No control").is_ok());
        assert!(configure_onu_port("HWTC1", "eth_0/1", "on", "LAN", "No control").is_err());
        assert!(configure_onu_port("HWTC1", "eth_0/1", "Enabled", "DMZ", "No control").is_err());
        assert!(configure_onu_port("HWTC1", "eth_0/1", "Enabled", "LAN", "always").is_err());
    }
}
