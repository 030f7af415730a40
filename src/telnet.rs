//! Telnet Command-Chain Sessions
//!
//! Drives an interactive device CLI as a linear script of expect / send
//! steps. A failed step poisons the chain: every later step is skipped
//! without touching the transport until the caller resets it.
//!
//! # Components
//!
//! - [`Transport`] / [`Connector`]: byte stream seam, with a TCP
//!   implementation that strips option negotiation
//! - [`Script`]: ordered [`Step`]s (authentication prefix, commands)
//! - [`TelnetSession`]: the state machine, with a bounded reconnect budget
//! - [`OutputGrammar`]: pure parsers over captured command output

mod grammar;
mod script;
mod session;
mod transport;

pub use grammar::{ActiveOnu, ActiveOnuGrammar, MacTableGrammar, OutputGrammar, format_mac};
pub use script::{Script, Step};
pub use session::{SessionOptions, SessionState, TelnetSession};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};

use std::time::Duration;

use thiserror::Error;

/// Why a command chain stopped.
///
/// Stored in the session rather than returned from each step, so a chain
/// of steps reads linearly and is checked once at the end.
#[derive(Debug, Error)]
pub enum ChainFailure {
    /// Transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Step ran with no open transport.
    #[error("session is not connected")]
    NotConnected,

    /// Read or write failed mid-chain.
    #[error("transport error: {0}")]
    Io(#[source] std::io::Error),

    /// Peer closed the stream.
    #[error("connection closed by peer")]
    Eof,

    /// Step deadline exceeded.
    #[error("{step} timed out after {timeout:?}")]
    Timeout {
        step: &'static str,
        timeout: Duration,
    },

    /// Output grew past the capture limit before the awaited text showed up.
    #[error("no match within {limit} bytes of output")]
    BufferOverflow { limit: usize },
}

impl ChainFailure {
    /// Failures that a fresh connection can cure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Eof)
    }

    /// Failures that mean the device was never reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}
