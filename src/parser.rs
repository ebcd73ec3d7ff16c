//! Parsers for raw MA5800 command output.
//!
//! All parsers are pure functions over the raw text. Shared rules: blank
//! lines, dashed rules and column-title rows are noise; `Frame N` / `Slot N`
//! marker lines update the location context applied to the data rows that
//! follow; a data row shorter than the entity's minimum token count is
//! skipped, not an error; numeric columns that fail to convert fall back to
//! 0. Zero entities out of a non-empty response is a valid empty result.

use chrono::Utc;
use regex_lite::Regex;
use std::sync::OnceLock;

use crate::models::{
    OnuLocation, OnuRecord, OnuStatus, ParsedEntity, PortConfig, SystemInfo, UnauthorizedOnu,
};

/// Which command produced the output being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    SystemInfo,
    OnuList,
    UnauthorizedOnus,
    PortConfig,
}

/// Parse raw output keyed by the command kind that produced it.
pub fn parse(kind: QueryKind, raw: &str) -> Vec<ParsedEntity> {
    match kind {
        QueryKind::SystemInfo => vec![ParsedEntity::System(parse_system_info(raw))],
        QueryKind::OnuList => parse_onu_list(raw).into_iter().map(ParsedEntity::Onu).collect(),
        QueryKind::UnauthorizedOnus => parse_unauthorized_onus(raw)
            .into_iter()
            .map(ParsedEntity::Unauthorized)
            .collect(),
        QueryKind::PortConfig => parse_port_config(raw).into_iter().map(ParsedEntity::Port).collect(),
    }
}

fn is_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.contains("-----")
}

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Frame\s+(\d+)").expect("frame regex"))
}

fn slot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Slot\s+(\d+)").expect("slot regex"))
}

/// Extract system info from the joined `display version` / `display
/// temperature` output. Missing keys stay empty; temperature falls back to 0.
pub fn parse_system_info(raw: &str) -> SystemInfo {
    let mut info = SystemInfo {
        model: String::new(),
        version: String::new(),
        uptime: String::new(),
        temperature: 0.0,
    };

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.starts_with("PRODUCT") {
            info.model = value.to_string();
        } else if key.starts_with("VERSION") {
            info.version = value.to_string();
        } else if key.starts_with("UPTIME") {
            info.uptime = value.to_string();
        } else if key.starts_with("Current temperature") {
            info.temperature = leading_number(value);
        }
    }

    info
}

/// Parse `display ont info 0 all` output into ONU records. Frame/Slot marker
/// lines set the location applied to subsequent rows.
pub fn parse_onu_list(raw: &str) -> Vec<OnuRecord> {
    let mut onus = Vec::new();
    let mut current_frame = 0u32;
    let mut current_slot = 0u32;

    for line in raw.lines() {
        if is_noise(line) {
            continue;
        }

        if let Some(caps) = frame_regex().captures(line) {
            current_frame = caps[1].parse().unwrap_or(0);
            continue;
        }
        if let Some(caps) = slot_regex().captures(line) {
            current_slot = caps[1].parse().unwrap_or(0);
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        // Column-title rows fail the numeric leading-column check
        let (Ok(port), Ok(onu_id)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) else {
            continue;
        };

        onus.push(OnuRecord {
            location: OnuLocation {
                frame: current_frame,
                slot: current_slot,
                port,
                onu_id,
            },
            onu_type: parts[2].to_string(),
            serial: parts[3].to_string(),
            status: parts[4].to_lowercase(),
            signal_dbm: parts[5].parse().unwrap_or(0.0),
            description: parts[6..].join(" "),
            last_seen: Utc::now(),
        });
    }

    onus
}

/// Parse `display ont autofind all` output into unauthorized ONU records.
pub fn parse_unauthorized_onus(raw: &str) -> Vec<UnauthorizedOnu> {
    let mut onus = Vec::new();

    for line in raw.lines() {
        if is_noise(line) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }
        let Ok(port) = parts[1].parse::<u32>() else {
            continue;
        };

        onus.push(UnauthorizedOnu {
            serial: parts[0].to_string(),
            port,
            first_seen: parts[2].to_string(),
            status: parts[3].to_lowercase(),
        });
    }

    onus
}

/// Parse ONU ethernet port rows (`show onu port-config`). Rows are keyed by
/// the `eth_` port name; the VLAN column is optional and falls back to 0.
pub fn parse_port_config(raw: &str) -> Vec<PortConfig> {
    let mut ports = Vec::new();

    for line in raw.lines() {
        if is_noise(line) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 || !parts[0].starts_with("eth") {
            continue;
        }

        ports.push(PortConfig {
            name: parts[0].to_string(),
            admin_state: parts[1].to_string(),
            mode: parts[2].to_string(),
            dhcp_mode: parts[3].replace('-', " "),
            vlan: parts.get(4).and_then(|v| v.parse().ok()).unwrap_or(0),
        });
    }

    ports
}

/// Assemble a live ONU status from the joined status/optical/port-config
/// output of the per-ONU queries.
pub fn parse_onu_status(raw: &str) -> OnuStatus {
    let mut status = OnuStatus {
        status: "unknown".to_string(),
        signal_dbm: 0.0,
        temperature: 0.0,
        uptime: String::new(),
        ports: parse_port_config(raw),
    };

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.starts_with("Run state") {
            status.status = value.to_lowercase();
        } else if key.starts_with("Rx power") {
            status.signal_dbm = leading_number(value);
        } else if key.starts_with("Temperature") {
            status.temperature = leading_number(value);
        } else if key.starts_with("Uptime") {
            status.uptime = value.to_string();
        }
    }

    status
}

/// First whitespace-delimited token parsed as a float, 0 on failure.
fn leading_number(value: &str) -> f64 {
    value
        .split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}
