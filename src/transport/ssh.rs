//! SSH channel backed by the ssh2 crate (libssh2). All libssh2 calls are
//! blocking, so they run on the blocking thread pool; the session object is
//! moved into each `spawn_blocking` call and handed back afterwards.

use async_trait::async_trait;
use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

use super::Channel;
use crate::error::{OltError, Result};

const SSH_TIMEOUT_SECS: u64 = 30;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

pub struct SshChannel {
    host: String,
    port: u16,
    username: String,
    password: String,
    session: Option<ssh2::Session>,
}

impl SshChannel {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            session: None,
        }
    }
}

#[async_trait]
impl Channel for SshChannel {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let host = self.host.clone();
        let port = self.port;
        let user = self.username.clone();
        let pass = self.password.clone();

        let session = tokio::task::spawn_blocking(move || ssh_connect(&host, port, &user, &pass))
            .await
            .map_err(|e| OltError::Connection(format!("task join error: {e}")))??;

        self.session = Some(session);
        tracing::info!("SSH session established with {}:{}", self.host, self.port);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<String> {
        let session = self
            .session
            .take()
            .ok_or_else(|| OltError::Connection("SSH channel is not connected".into()))?;
        let command = command.to_string();

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = ssh_exec(&session, &command);
            (session, result)
        })
        .await
        .map_err(|e| OltError::Connection(format!("task join error: {e}")))?;

        self.session = Some(session);
        result
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let _ = tokio::task::spawn_blocking(move || {
                session.disconnect(None, "closing", None).ok();
            })
            .await;
            tracing::info!("SSH session to {} closed", self.host);
        }
        Ok(())
    }
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// Blocking; call from a spawn_blocking context.
fn ssh_connect(host: &str, port: u16, user: &str, pass: &str) -> Result<ssh2::Session> {
    let addr = format!("{host}:{port}");
    let socket_addr = addr
        .parse()
        .map_err(|e| OltError::Connection(format!("invalid address {addr}: {e}")))?;
    let tcp = TcpStream::connect_timeout(&socket_addr, Duration::from_secs(SSH_TIMEOUT_SECS))
        .map_err(|e| OltError::Connection(format!("TCP connection failed: {e}")))?;

    tcp.set_read_timeout(Some(Duration::from_secs(SSH_TIMEOUT_SECS))).ok();
    tcp.set_write_timeout(Some(Duration::from_secs(SSH_TIMEOUT_SECS))).ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| OltError::Connection(format!("failed to create SSH session: {e}")))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(SSH_TIMEOUT_SECS as u32 * 1000);
    session
        .handshake()
        .map_err(|e| OltError::Connection(format!("SSH handshake failed: {e}")))?;

    // Try password auth first
    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Fall back to keyboard-interactive (some OLT firmwares require it)
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err(OltError::Connection(
            "SSH authentication failed: all methods exhausted".into(),
        ))
    }
}

/// Run one command over an exec channel. A non-zero exit status becomes a
/// `Command` error carrying the device's stderr text.
fn ssh_exec(session: &ssh2::Session, command: &str) -> Result<String> {
    let mut channel = session
        .channel_session()
        .map_err(|e| OltError::Connection(format!("failed to open channel: {e}")))?;

    channel
        .exec(command)
        .map_err(|e| OltError::Command(format!("failed to execute command: {e}")))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| OltError::Command(format!("failed to read output: {e}")))?;

    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr).ok();

    channel
        .wait_close()
        .map_err(|e| OltError::Command(format!("failed to close channel: {e}")))?;

    let code = channel.exit_status().unwrap_or(0);
    if code != 0 {
        return Err(OltError::Command(format!(
            "exit status {code}: {}",
            stderr.trim()
        )));
    }

    Ok(output)
}
