//! Transport channels to one OLT endpoint.
//!
//! A `Channel` is a single stateful connection carrying no business logic:
//! the session layer owns its lifecycle and serializes every `send` against
//! it. The concrete channel is selected by configuration, never by which
//! module happened to be imported.

pub mod sim;
pub mod snmp;
pub mod ssh;
pub mod telnet;

use async_trait::async_trait;

use crate::config::{transport_kind, Config};
use crate::error::Result;

/// One stateful connection (CLI session or OID request/response) to a device.
#[async_trait]
pub trait Channel: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Send one command (or OID query) and return the raw response text.
    async fn send(&mut self, command: &str) -> Result<String>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Build the channel the configuration asks for. Simulation mode wins over
/// the transport kind so the rest of the system never touches hardware.
pub fn build(config: &Config) -> Box<dyn Channel> {
    if config.simulation_mode {
        tracing::info!("simulation mode enabled, using simulated channel");
        return Box::new(sim::SimChannel::new());
    }

    match config.transport.as_str() {
        transport_kind::SSH => Box::new(ssh::SshChannel::new(
            &config.olt_host,
            config.olt_port,
            &config.olt_username,
            &config.olt_password,
        )),
        transport_kind::SNMP => Box::new(snmp::SnmpChannel::new(
            &config.olt_host,
            config.olt_port,
            &config.snmp_community,
        )),
        transport_kind::TELNET => Box::new(telnet::TelnetChannel::new(
            &config.olt_host,
            config.olt_port,
            &config.olt_username,
            &config.olt_password,
        )),
        other => {
            tracing::warn!("unknown transport kind '{}', falling back to telnet", other);
            Box::new(telnet::TelnetChannel::new(
                &config.olt_host,
                config.olt_port,
                &config.olt_username,
                &config.olt_password,
            ))
        }
    }
}
