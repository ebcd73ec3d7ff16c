//! Telnet-style CLI channel over a raw TCP stream. The device echoes a
//! shell prompt (`>` or `#`) when a command's output is complete, so reads
//! accumulate until the prompt shows up at the end of the buffer. The
//! session layer bounds every send with its own timeout.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Channel;
use crate::error::{OltError, Result};

pub struct TelnetChannel {
    host: String,
    port: u16,
    username: String,
    password: String,
    stream: Option<TcpStream>,
}

impl TelnetChannel {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            stream: None,
        }
    }

    async fn read_until(stream: &mut TcpStream, done: impl Fn(&str) -> bool) -> Result<String> {
        let mut data = String::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| OltError::Connection(format!("read failed: {e}")))?;
            if n == 0 {
                return Err(OltError::Connection("connection closed by device".into()));
            }
            data.push_str(&String::from_utf8_lossy(&buf[..n]));
            if done(&data) {
                return Ok(data);
            }
        }
    }

    async fn write_line(stream: &mut TcpStream, line: &str) -> Result<()> {
        stream
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| OltError::Connection(format!("write failed: {e}")))
    }
}

/// A response is complete when the device prints its shell prompt again.
fn at_prompt(data: &str) -> bool {
    let tail = data.trim_end_matches([' ', '\t']);
    tail.ends_with('>') || tail.ends_with('#')
}

#[async_trait]
impl Channel for TelnetChannel {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| OltError::Connection(format!("telnet connection to {addr} failed: {e}")))?;

        // Login handshake: username prompt, password prompt, then shell prompt
        Self::read_until(&mut stream, |d| d.trim_end().ends_with("Username:")).await?;
        Self::write_line(&mut stream, &self.username).await?;
        Self::read_until(&mut stream, |d| d.trim_end().ends_with("Password:")).await?;
        Self::write_line(&mut stream, &self.password).await?;
        let banner = Self::read_until(&mut stream, at_prompt).await?;

        if banner.contains("Invalid") || banner.contains("failed") {
            return Err(OltError::Connection("telnet login rejected".into()));
        }

        self.stream = Some(stream);
        tracing::info!("telnet session established with {}", addr);
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| OltError::Connection("telnet channel is not connected".into()))?;

        Self::write_line(stream, command).await?;
        let raw = Self::read_until(stream, at_prompt).await?;

        // Device-side error markers surface as command failures, not noise
        if raw.contains("% Unknown command") || raw.contains("Failure:") {
            return Err(OltError::Command(raw.trim().to_string()));
        }

        Ok(raw)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = Self::write_line(&mut stream, "quit").await;
            let _ = stream.shutdown().await;
            tracing::info!("telnet session to {} closed", self.host);
        }
        Ok(())
    }
}
