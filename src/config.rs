use std::env;

/// Canonical transport kind values
pub mod transport_kind {
    pub const SSH: &str = "ssh";
    pub const TELNET: &str = "telnet";
    pub const SNMP: &str = "snmp";
}

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub olt_host: String,
    pub olt_port: u16,
    pub olt_username: String,
    pub olt_password: String,
    /// One of "ssh", "telnet", "snmp"
    pub transport: String,
    pub snmp_community: String,
    pub command_timeout_secs: u64,
    pub simulation_mode: bool,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let transport = get_env("OLT_TRANSPORT", transport_kind::TELNET).to_lowercase();
        let default_port: u16 = match transport.as_str() {
            transport_kind::SSH => 22,
            transport_kind::SNMP => 161,
            _ => 23,
        };

        Self {
            olt_host: get_env("OLT_HOST", "localhost"),
            olt_port: get_env("OLT_PORT", "").parse().unwrap_or(default_port),
            olt_username: get_env("OLT_USERNAME", "admin"),
            olt_password: get_env("OLT_PASSWORD", "admin"),
            transport,
            snmp_community: get_env("OLT_SNMP_COMMUNITY", "public"),
            command_timeout_secs: get_env("OLT_COMMAND_TIMEOUT_SECS", "30")
                .parse()
                .unwrap_or(30),
            simulation_mode: get_env("SIMULATION_MODE", "false") == "true",
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the env mutations never race another test thread.
    #[test]
    fn port_defaults_follow_transport() {
        env::set_var("OLT_TRANSPORT", "ssh");
        env::remove_var("OLT_PORT");
        assert_eq!(Config::load().olt_port, 22);

        // An unparsable override falls back to the transport default,
        // not the telnet port.
        env::set_var("OLT_PORT", "not-a-port");
        assert_eq!(Config::load().olt_port, 22);

        env::set_var("OLT_TRANSPORT", "snmp");
        assert_eq!(Config::load().olt_port, 161);

        env::set_var("OLT_PORT", "2323");
        env::set_var("OLT_TRANSPORT", "telnet");
        assert_eq!(Config::load().olt_port, 2323);

        env::remove_var("OLT_PORT");
        env::remove_var("OLT_TRANSPORT");
    }
}
