//! Session manager: owns the one live channel to a device endpoint and
//! serializes every command against it.
//!
//! The channel sits behind a fair tokio mutex, so concurrent callers queue
//! in FIFO order and exactly one command is ever in flight. Connecting runs
//! under the same lock, which collapses concurrent connect calls into the
//! in-flight attempt: whoever queued behind it observes the connected state
//! and returns without a second physical dial.

use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{OltError, Result};
use crate::transport::Channel;

pub const MAX_CONNECT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

struct Inner {
    channel: Box<dyn Channel>,
    state: SessionState,
    retries: u32,
}

pub struct SessionManager {
    inner: Mutex<Inner>,
    command_timeout: Duration,
}

impl SessionManager {
    pub fn new(channel: Box<dyn Channel>, command_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                channel,
                state: SessionState::Disconnected,
                retries: 0,
            }),
            command_timeout,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Establish the channel if not already connected. Failures increment a
    /// retry counter that only resets on a later successful connect; once it
    /// reaches the cap the error turns fatal.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        connect_locked(&mut inner).await
    }

    /// Execute one command on the channel, connecting first if needed.
    /// Bounded by the configured command timeout.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        connect_locked(&mut inner).await?;
        execute_locked(&mut inner, command, self.command_timeout).await
    }

    /// Execute an ordered command sequence while holding the channel for the
    /// whole run, so no other caller's commands interleave mid-sequence.
    pub async fn run_sequence(&self, commands: &[String]) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        connect_locked(&mut inner).await?;

        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            outputs.push(execute_locked(&mut inner, command, self.command_timeout).await?);
        }
        Ok(outputs)
    }

    /// Idempotent: releases the channel and returns to Disconnected.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Connected {
            if let Err(e) = inner.channel.disconnect().await {
                tracing::warn!("error while disconnecting: {}", e);
            }
        }
        inner.state = SessionState::Disconnected;
        tracing::info!("session disconnected");
    }
}

async fn connect_locked(inner: &mut Inner) -> Result<()> {
    if inner.state == SessionState::Connected {
        return Ok(());
    }

    // Linear backoff between consecutive failed attempts
    if inner.retries > 0 {
        tokio::time::sleep(Duration::from_millis(500 * inner.retries as u64)).await;
    }

    inner.state = SessionState::Connecting;
    match inner.channel.connect().await {
        Ok(()) => {
            inner.state = SessionState::Connected;
            inner.retries = 0;
            tracing::info!("session connected");
            Ok(())
        }
        Err(e) => {
            inner.retries += 1;
            let message = e.to_string();
            if inner.retries >= MAX_CONNECT_RETRIES {
                inner.state = SessionState::Failed;
                tracing::error!(
                    "connection failed (attempt {}), giving up: {}",
                    inner.retries,
                    message
                );
                Err(OltError::ConnectionFatal {
                    retries: inner.retries,
                    message,
                })
            } else {
                inner.state = SessionState::Disconnected;
                tracing::warn!("connection failed (attempt {}): {}", inner.retries, message);
                Err(OltError::Connection(message))
            }
        }
    }
}

async fn execute_locked(inner: &mut Inner, command: &str, timeout: Duration) -> Result<String> {
    tracing::debug!("executing command: {}", command);
    match tokio::time::timeout(timeout, inner.channel.send(command)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("command timed out after {:?}: {}", timeout, command);
            Err(OltError::CommandTimeout(timeout))
        }
    }
}
