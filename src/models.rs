use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical batch operation status values
pub mod batch_status {
    pub const PENDING: &str = "pending";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const COMPLETED: &str = "completed";
    pub const COMPLETED_WITH_ERRORS: &str = "completed_with_errors";
    pub const FAILED: &str = "failed";
}

/// Canonical sub-operation status values
pub mod sub_status {
    pub const PENDING: &str = "pending";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// Canonical sub-operation type values
pub mod op_type {
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const REBOOT: &str = "reboot";
    pub const CONFIGURE: &str = "configure";

    pub const ALL: &[&str] = &[START, STOP, REBOOT, CONFIGURE];
}

/// Canonical history event type tags
pub mod event_type {
    pub const START: &str = "START";
    pub const STOP: &str = "STOP";
    pub const REBOOT: &str = "REBOOT";
    pub const CONFIGURE: &str = "CONFIGURE";
    pub const AUTHORIZE: &str = "AUTHORIZE";
    pub const ERROR: &str = "ERROR";
    pub const STATUS_CHANGE: &str = "STATUS_CHANGE";
}

// ========== Parsed device entities ==========

/// Physical location of an ONU on the OLT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnuLocation {
    pub frame: u32,
    pub slot: u32,
    pub port: u32,
    pub onu_id: u32,
}

/// OLT system information (model, firmware, uptime, chassis temperature)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub model: String,
    pub version: String,
    pub uptime: String,
    pub temperature: f64,
}

/// One authorized ONU as reported by the OLT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnuRecord {
    pub location: OnuLocation,
    pub onu_type: String,
    pub serial: String,
    pub status: String,
    pub signal_dbm: f64,
    pub description: String,
    pub last_seen: DateTime<Utc>,
}

/// An ONU seen by autofind but not yet authorized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnauthorizedOnu {
    pub serial: String,
    pub port: u32,
    /// Raw device timestamp string; the device's column format varies by firmware
    pub first_seen: String,
    pub status: String,
}

/// Configuration of one ONU ethernet port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,
    pub admin_state: String,
    pub mode: String,
    pub dhcp_mode: String,
    pub vlan: u16,
}

/// Closed set of structured records extracted from raw device output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum ParsedEntity {
    System(SystemInfo),
    Onu(OnuRecord),
    Unauthorized(UnauthorizedOnu),
    Port(PortConfig),
}

/// Live status of a single ONU, assembled from several device queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnuStatus {
    pub status: String,
    pub signal_dbm: f64,
    pub temperature: f64,
    pub uptime: String,
    pub ports: Vec<PortConfig>,
}

// ========== Device operation requests ==========

/// Optional per-ONU configuration payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnuConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srv_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_vlan: Option<u16>,
}

fn default_profile() -> String {
    "1".to_string()
}

/// Request to authorize a discovered ONU on a PON port
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// PON port in frame/slot/port form, e.g. "0/1/0"
    pub port: String,
    pub serial: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_profile")]
    pub line_profile: String,
    #[serde(default = "default_profile")]
    pub srv_profile: String,
    #[serde(default)]
    pub native_vlan: Option<u16>,
}

/// Last known detection of an ONU (port, state) kept by the device service
#[derive(Debug, Clone, Serialize)]
pub struct OnuDetection {
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

// ========== Batch operations ==========

/// One action targeting one ONU within a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOperation {
    #[serde(rename = "type")]
    pub op_type: String,
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<OnuConfig>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A caller-submitted group of ONU actions processed under one state machine
#[derive(Debug, Clone, Serialize)]
pub struct BatchOperation {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub operations: Vec<SubOperation>,
}

/// One entry in a batch creation request
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRequest {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub config: Option<OnuConfig>,
}

/// Filter for listing batch operations; empty filter matches everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
}

// ========== Event history ==========

/// One lifecycle event in an ONU's bounded history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<OnuConfig>,
}

impl HistoryEvent {
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            status: None,
            description: None,
            config: None,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, config: OnuConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Filter for querying an ONU's history; empty filter matches everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Aggregate history metrics for one ONU
#[derive(Debug, Clone, Serialize)]
pub struct SerialMetrics {
    pub total: usize,
    pub last_24h: usize,
    pub last_week: usize,
    pub by_type: HashMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<HistoryEvent>,
}

/// Recent activity counters across all ONUs
#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub last_24h: usize,
    pub last_week: usize,
}

/// Aggregate history metrics across all ONUs
#[derive(Debug, Clone, Serialize)]
pub struct GlobalMetrics {
    pub total_events: usize,
    pub active_serials: usize,
    pub events_by_type: HashMap<String, usize>,
    pub recent_activity: RecentActivity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sub_operation_json_uses_type_key_and_omits_empty_fields() {
        let op = SubOperation {
            op_type: op_type::REBOOT.to_string(),
            serial: "HWTC12345678".to_string(),
            config: None,
            status: sub_status::PENDING.to_string(),
            error: None,
            started_at: None,
            completed_at: None,
        };

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "reboot",
                "serial": "HWTC12345678",
                "status": "pending",
            })
        );
    }

    #[test]
    fn failed_sub_operation_json_carries_error() {
        let mut op = SubOperation {
            op_type: op_type::START.to_string(),
            serial: "HWTC12345678".to_string(),
            config: None,
            status: sub_status::FAILED.to_string(),
            error: Some("command timed out".to_string()),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };
        op.config = Some(OnuConfig {
            line_profile: Some("2".to_string()),
            srv_profile: None,
            native_vlan: None,
        });

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["error"], "command timed out");
        assert_eq!(value["config"]["line_profile"], "2");
        // None sub-fields inside config stay out of the payload too
        assert!(value["config"].get("srv_profile").is_none());
        assert!(value.get("started_at").is_some());
    }

    #[test]
    fn operation_request_deserializes_with_defaults() {
        let req: OperationRequest =
            serde_json::from_str(r#"{"type": "configure"}"#).unwrap();
        assert_eq!(req.op_type, "configure");
        assert_eq!(req.serial, "");
        assert!(req.config.is_none());

        let req: OperationRequest = serde_json::from_str(
            r#"{"type": "configure", "serial": "HWTC0A0B0C0D", "config": {"native_vlan": 100}}"#,
        )
        .unwrap();
        assert_eq!(req.serial, "HWTC0A0B0C0D");
        assert_eq!(req.config.unwrap().native_vlan, Some(100));
    }

    #[test]
    fn history_event_json_round_trips() {
        let event = HistoryEvent::new(event_type::STATUS_CHANGE)
            .with_status("online")
            .with_description("settled after reboot");

        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains(r#""type":"STATUS_CHANGE""#));

        let back: HistoryEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event_type, event.event_type);
        assert_eq!(back.status.as_deref(), Some("online"));
        assert_eq!(back.timestamp, event.timestamp);
        assert!(back.config.is_none());
    }
}
