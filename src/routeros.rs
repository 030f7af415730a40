//! RouterOS API Client
//!
//! Minimal client for the binary API on TCP port 8728: length-prefixed
//! words, sentences closed by an empty word, `!re` / `!done` / `!trap` /
//! `!fatal` replies.
//!
//! # Components
//!
//! - [`codec`]: word and sentence framing, reply parsing
//! - [`ApiClient`]: login and command execution over any byte stream
//! - [`ApiConnector`]: opens authenticated sessions, implemented over TCP
//!   by [`TcpApiConnector`]

pub mod codec;
mod client;

pub use client::{ApiClient, Record, connect};

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the RouterOS API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("api request timed out")]
    Timeout,

    #[error("api transport error: {0}")]
    Io(#[source] std::io::Error),

    #[error("api connection closed by peer")]
    Closed,

    #[error("api protocol error: {0}")]
    Protocol(String),

    #[error("login rejected: {0}")]
    Login(String),

    #[error("command failed: {0}")]
    Trap(String),

    #[error("session terminated: {0}")]
    Fatal(String),
}

impl ApiError {
    pub(crate) fn from_read(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Closed
        } else {
            Self::Io(e)
        }
    }

    /// True when the device could not be reached or dropped the stream.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout | Self::Io(_) | Self::Closed
        )
    }
}

// =============================================================================
// Session seam
// =============================================================================

/// An authenticated API session.
#[async_trait::async_trait]
pub trait ApiSession: Send {
    async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, ApiError>;
}

#[async_trait::async_trait]
impl<S> ApiSession for ApiClient<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, ApiError> {
        ApiClient::run(self, command, args).await
    }
}

/// Opens logged-in sessions to a device.
#[async_trait::async_trait]
pub trait ApiConnector: Send + Sync {
    async fn open(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn ApiSession>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct TcpApiConnector {
    port: u16,
    timeout: Duration,
}

impl TcpApiConnector {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait::async_trait]
impl ApiConnector for TcpApiConnector {
    async fn open(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn ApiSession>, ApiError> {
        let mut client = connect(&format!("{host}:{}", self.port), self.timeout).await?;
        client.login(username, password).await?;
        Ok(Box::new(client))
    }
}
