//! Device operation layer: turns typed intents into command sequences, runs
//! them through the session, parses the output, and records lifecycle
//! events in the history store. Validation failures never reach the session.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};

use crate::commands;
use crate::error::Result;
use crate::history::HistoryService;
use crate::models::{
    event_type, AuthorizeRequest, HistoryEvent, OnuConfig, OnuDetection, OnuRecord, OnuStatus,
    SystemInfo, UnauthorizedOnu,
};
use crate::parser;
use crate::session::SessionManager;

const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Handle for an in-flight post-reboot settle. Dropping the sender cancels
/// the scheduled status-change.
struct SettleTask {
    cancel_tx: oneshot::Sender<()>,
}

pub struct OltService {
    session: Arc<SessionManager>,
    history: Arc<HistoryService>,
    detections: RwLock<HashMap<String, OnuDetection>>,
    settles: Arc<Mutex<HashMap<String, SettleTask>>>,
    settle_delay: Duration,
}

impl OltService {
    pub fn new(session: Arc<SessionManager>, history: Arc<HistoryService>) -> Self {
        Self {
            session,
            history,
            detections: RwLock::new(HashMap::new()),
            settles: Arc::new(Mutex::new(HashMap::new())),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Connect and put the CLI into config mode.
    pub async fn initialize(&self) -> Result<()> {
        self.session.connect().await?;
        self.session
            .run_sequence(&commands::enter_config_mode())
            .await?;
        tracing::info!("OLT service initialized");
        Ok(())
    }

    pub async fn get_system_info(&self) -> Result<SystemInfo> {
        let outputs = self.session.run_sequence(&commands::system_info()).await?;
        Ok(parser::parse_system_info(&outputs.join("\n")))
    }

    pub async fn list_onus(&self) -> Result<Vec<OnuRecord>> {
        let outputs = self.session.run_sequence(&commands::onu_list()).await?;
        Ok(parser::parse_onu_list(&outputs.join("\n")))
    }

    pub async fn list_unauthorized_onus(&self) -> Result<Vec<UnauthorizedOnu>> {
        let outputs = self
            .session
            .run_sequence(&commands::unauthorized_onus())
            .await?;
        Ok(parser::parse_unauthorized_onus(&outputs.join("\n")))
    }

    pub async fn authorize_onu(&self, req: &AuthorizeRequest) -> Result<()> {
        let cmds = commands::authorize_onu(req)?;
        self.run_action(
            &req.serial,
            cmds,
            HistoryEvent::new(event_type::AUTHORIZE)
                .with_status("authorized")
                .with_description(format!("authorized on port {}", req.port)),
        )
        .await?;

        self.detections.write().await.insert(
            req.serial.clone(),
            OnuDetection {
                port: req.port.clone(),
                description: Some(req.description.clone()),
                status: "authorized".to_string(),
                timestamp: Utc::now(),
            },
        );
        tracing::info!("ONU {} authorized on port {}", req.serial, req.port);
        Ok(())
    }

    pub async fn delete_onu(&self, port: &str, onu_id: u32) -> Result<()> {
        let cmds = commands::delete_onu(port, onu_id)?;
        self.session.run_sequence(&cmds).await?;
        tracing::info!("ONU {} deleted from port {}", onu_id, port);
        Ok(())
    }

    pub async fn configure_vlan(&self, vlan: u16, description: &str, ports: &[String]) -> Result<()> {
        let cmds = commands::configure_vlan(vlan, description, ports)?;
        self.session.run_sequence(&cmds).await?;
        tracing::info!("VLAN {} configured on {} port(s)", vlan, ports.len());
        Ok(())
    }

    pub async fn get_onu_status(&self, serial: &str) -> Result<OnuStatus> {
        let cmds = commands::onu_status(serial)?;
        let outputs = self.session.run_sequence(&cmds).await?;
        Ok(parser::parse_onu_status(&outputs.join("\n")))
    }

    pub async fn configure_onu_port(
        &self,
        serial: &str,
        port_name: &str,
        admin_state: &str,
        mode: &str,
        dhcp: &str,
    ) -> Result<()> {
        let cmds = commands::configure_onu_port(serial, port_name, admin_state, mode, dhcp)?;
        self.session.run_sequence(&cmds).await
            .map(|_| ())
    }

    pub async fn start_onu(&self, serial: &str) -> Result<()> {
        let cmds = commands::start_onu(serial)?;
        self.run_action(
            serial,
            cmds,
            HistoryEvent::new(event_type::START)
                .with_status("online")
                .with_description("ONU started manually"),
        )
        .await
    }

    pub async fn stop_onu(&self, serial: &str) -> Result<()> {
        let cmds = commands::stop_onu(serial)?;
        self.run_action(
            serial,
            cmds,
            HistoryEvent::new(event_type::STOP)
                .with_status("offline")
                .with_description("ONU stopped manually"),
        )
        .await
    }

    /// Reboot an ONU. The device comes back on its own; the settle task
    /// records the status change once the settle delay elapses, and is
    /// cancellable and observable in the meantime.
    pub async fn reboot_onu(&self, serial: &str) -> Result<()> {
        let cmds = commands::reboot_onu(serial)?;
        self.run_action(
            serial,
            cmds,
            HistoryEvent::new(event_type::REBOOT)
                .with_status("rebooting")
                .with_description("ONU rebooting"),
        )
        .await?;

        self.schedule_settle(serial).await;
        Ok(())
    }

    pub async fn configure_onu(&self, serial: &str, config: &OnuConfig) -> Result<()> {
        let cmds = commands::configure_onu(serial, config)?;
        self.run_action(
            serial,
            cmds,
            HistoryEvent::new(event_type::CONFIGURE)
                .with_description("ONU configuration updated")
                .with_config(config.clone()),
        )
        .await
    }

    /// Record where an ONU was last seen.
    pub async fn register_detection(&self, serial: &str, detection: OnuDetection) {
        tracing::info!("registering detection for ONU {} on port {}", serial, detection.port);
        self.detections.write().await.insert(serial.to_string(), detection);
    }

    /// Last known location of an ONU, if any detection was recorded.
    pub async fn last_known_location(&self, serial: &str) -> Option<OnuDetection> {
        self.detections.read().await.get(serial).cloned()
    }

    /// Whether a post-reboot settle is still pending for this serial.
    pub async fn reboot_settling(&self, serial: &str) -> bool {
        self.settles.lock().await.contains_key(serial)
    }

    /// Cancel a pending settle; no status-change event will be recorded.
    pub async fn cancel_settle(&self, serial: &str) {
        if let Some(task) = self.settles.lock().await.remove(serial) {
            let _ = task.cancel_tx.send(());
            tracing::info!("settle cancelled for ONU {}", serial);
        }
    }

    /// Run a command sequence and record either the given event or an ERROR
    /// event carrying the failure message. Errors propagate to the caller.
    async fn run_action(&self, serial: &str, cmds: Vec<String>, event: HistoryEvent) -> Result<()> {
        match self.session.run_sequence(&cmds).await {
            Ok(_) => {
                self.history.append(serial, event).await;
                Ok(())
            }
            Err(e) => {
                self.history
                    .append(
                        serial,
                        HistoryEvent::new(event_type::ERROR)
                            .with_status("error")
                            .with_description(format!("{} failed: {e}", event.event_type)),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn schedule_settle(&self, serial: &str) {
        let mut settles = self.settles.lock().await;
        // A newer reboot supersedes any pending settle for the same serial
        if let Some(previous) = settles.remove(serial) {
            let _ = previous.cancel_tx.send(());
        }

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let serial = serial.to_string();
        let delay = self.settle_delay;
        let history = self.history.clone();
        let tasks = Arc::clone(&self.settles);

        settles.insert(serial.clone(), SettleTask { cancel_tx });
        drop(settles);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    history
                        .append(
                            &serial,
                            HistoryEvent::new(event_type::STATUS_CHANGE)
                                .with_status("online")
                                .with_description("ONU back online after reboot"),
                        )
                        .await;
                    tasks.lock().await.remove(&serial);
                    tracing::debug!("ONU {} settled after reboot", serial);
                }
                _ = &mut cancel_rx => {}
            }
        });
    }
}
