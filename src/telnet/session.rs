//! Command-chain session state machine.
//!
//! Every step consumes the session and hands it back. A step that fails
//! records a [`ChainFailure`] and moves the session to
//! [`SessionState::Failed`]; later steps see the failure and return
//! immediately without any I/O.
//!
//! ```text
//! Idle -> Connected -> Authenticated <-> Executing
//!   \         \             \              \
//!    `---------`-------------`--------------`--> Failed | Closed
//! ```

use std::time::Duration;

use tokio::time::timeout;

use crate::telnet::{ChainFailure, Connector, OutputGrammar, Script, Step, Transport};

/// Default per-step deadline.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on buffered output while waiting for a pattern or delimiter.
pub const DEFAULT_MAX_BUFFER: usize = 1024 * 1024;

const LINE_TERMINATOR: &[u8] = b"\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Authenticated,
    Executing,
    Closed,
    Failed,
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for each read or write step.
    pub step_timeout: Duration,
    /// Reconnects allowed over the session's whole life.
    pub reconnect_attempts: u32,
    pub max_buffer: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            step_timeout: DEFAULT_STEP_TIMEOUT,
            reconnect_attempts: 0,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

/// A telnet session owned by one worker.
pub struct TelnetSession<C: Connector> {
    connector: C,
    address: String,
    options: SessionOptions,
    transport: Option<C::Transport>,
    state: SessionState,
    /// State to return to when a failure is cleared.
    settled: SessionState,
    failure: Option<ChainFailure>,
    /// Received bytes not yet consumed by a step.
    pending: Vec<u8>,
    captured: Vec<u8>,
    auth: Script,
    reconnects_left: u32,
}

impl<C: Connector> TelnetSession<C> {
    pub fn new(connector: C, address: impl Into<String>, options: SessionOptions) -> Self {
        let reconnects_left = options.reconnect_attempts;
        Self {
            connector,
            address: address.into(),
            options,
            transport: None,
            state: SessionState::Idle,
            settled: SessionState::Idle,
            failure: None,
            pending: Vec::new(),
            captured: Vec::new(),
            auth: Script::new(),
            reconnects_left,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&ChainFailure> {
        self.failure.as_ref()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn reconnects_left(&self) -> u32 {
        self.reconnects_left
    }

    /// Output captured by the last successful `ReadUntil`.
    pub fn captured(&self) -> &[u8] {
        &self.captured
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the transport.
    pub async fn connect(mut self) -> Self {
        if self.failure.is_some() {
            return self;
        }
        match self.connector.connect(&self.address).await {
            Ok(transport) => {
                tracing::debug!(address = %self.address, "Telnet connected");
                self.transport = Some(transport);
                self.pending.clear();
                self.enter(SessionState::Connected);
            }
            Err(e) => self.fail(ChainFailure::Connect(e)),
        }
        self
    }

    /// Run the authentication script and remember it for reconnects.
    pub async fn authenticate(mut self, script: Script) -> Self {
        self.auth = script;
        if self.failure.is_some() {
            return self;
        }

        let auth = self.auth.clone();
        self = self.run_script(&auth).await;
        if self.failure.is_none() {
            self.enter(SessionState::Authenticated);
            return self;
        }
        self.recover().await
    }

    /// Run one command script. On a transport failure the session
    /// reconnects, replays authentication and reruns the script, as long
    /// as the reconnect budget lasts.
    pub async fn execute(mut self, command: &Script) -> Self {
        loop {
            if self.failure.is_some() {
                return self;
            }
            self.state = SessionState::Executing;
            self = self.run_script(command).await;
            if self.failure.is_none() {
                self.enter(SessionState::Authenticated);
                return self;
            }

            let before = self.reconnects_left;
            self = self.recover().await;
            if self.reconnects_left == before {
                return self;
            }
        }
    }

    /// Clear a failure so the next command can run. The captured buffer
    /// is emptied; the reconnect budget is not restored.
    pub fn reset(mut self) -> Self {
        self.failure = None;
        self.captured.clear();
        self.state = if self.transport.is_some() {
            self.settled
        } else {
            SessionState::Idle
        };
        self
    }

    /// Drop the transport.
    pub fn close(mut self) -> SessionState {
        self.transport = None;
        if self.failure.is_none() {
            self.state = SessionState::Closed;
        }
        tracing::debug!(address = %self.address, state = ?self.state, "Telnet session closed");
        self.state
    }

    /// Parse the captured buffer. A failed chain yields no records.
    pub fn extract<G: OutputGrammar>(&self, grammar: &G) -> Vec<G::Record> {
        if self.failure.is_some() {
            return Vec::new();
        }
        grammar.parse(&String::from_utf8_lossy(&self.captured))
    }

    // =========================================================================
    // Steps
    // =========================================================================

    pub async fn expect<I, S>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        self.step(&Step::Expect(patterns)).await
    }

    pub async fn send_line(self, text: impl Into<String>) -> Self {
        self.step(&Step::SendLine(text.into())).await
    }

    pub async fn read_until(self, delimiter: u8) -> Self {
        self.step(&Step::ReadUntil(delimiter)).await
    }

    async fn run_script(mut self, script: &Script) -> Self {
        for step in script.steps() {
            if self.failure.is_some() {
                break;
            }
            self = self.step(step).await;
        }
        self
    }

    async fn step(mut self, step: &Step) -> Self {
        if self.failure.is_some() {
            return self;
        }
        let Some(transport) = self.transport.as_mut() else {
            self.fail(ChainFailure::NotConnected);
            return self;
        };

        let step_timeout = self.options.step_timeout;
        let limit = self.options.max_buffer;
        let result = match step {
            Step::Expect(patterns) => {
                let pending = &mut self.pending;
                timeout(
                    step_timeout,
                    fill_until(transport, pending, limit, |buf| find_any(buf, patterns)),
                )
                .await
                .map_err(|_| ChainFailure::Timeout {
                    step: "expect",
                    timeout: step_timeout,
                })
                .and_then(|found| {
                    found.map(|end| {
                        self.pending.drain(..end);
                    })
                })
            }
            Step::SendLine(text) => {
                let mut line = Vec::with_capacity(text.len() + LINE_TERMINATOR.len());
                line.extend_from_slice(text.as_bytes());
                line.extend_from_slice(LINE_TERMINATOR);
                timeout(step_timeout, transport.write_all(&line))
                    .await
                    .map_err(|_| ChainFailure::Timeout {
                        step: "send",
                        timeout: step_timeout,
                    })
                    .and_then(|r| r.map_err(ChainFailure::Io))
            }
            Step::ReadUntil(delimiter) => {
                let pending = &mut self.pending;
                timeout(
                    step_timeout,
                    fill_until(transport, pending, limit, |buf| {
                        buf.iter().position(|b| b == delimiter).map(|i| i + 1)
                    }),
                )
                .await
                .map_err(|_| ChainFailure::Timeout {
                    step: "read",
                    timeout: step_timeout,
                })
                .and_then(|found| {
                    found.map(|end| {
                        self.captured = self.pending.drain(..end).collect();
                    })
                })
            }
        };

        if let Err(failure) = result {
            self.fail(failure);
        }
        self
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn enter(&mut self, state: SessionState) {
        self.state = state;
        self.settled = state;
    }

    fn fail(&mut self, failure: ChainFailure) {
        tracing::debug!(address = %self.address, error = %failure, "Command chain failed");
        self.failure = Some(failure);
        self.state = SessionState::Failed;
    }

    /// Spend reconnect budget until authentication succeeds again, the
    /// budget runs out, or a failure occurs that a reconnect cannot cure.
    async fn recover(mut self) -> Self {
        while self.reconnects_left > 0
            && self
                .failure
                .as_ref()
                .is_some_and(|f| f.is_transport() || f.is_connection())
        {
            self.reconnects_left -= 1;
            tracing::info!(
                address = %self.address,
                error = ?self.failure,
                reconnects_left = self.reconnects_left,
                "Reconnecting telnet session"
            );

            self.transport = None;
            self.pending.clear();
            self.failure = None;

            self = self.connect().await;
            let auth = self.auth.clone();
            self = self.run_script(&auth).await;
            if self.failure.is_none() {
                self.enter(SessionState::Authenticated);
                break;
            }
        }
        self
    }
}

impl<C: Connector> std::fmt::Debug for TelnetSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetSession")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .field("reconnects_left", &self.reconnects_left)
            .finish_non_exhaustive()
    }
}

/// Read into `pending` until `find` reports the end of a match.
async fn fill_until<T, F>(
    transport: &mut T,
    pending: &mut Vec<u8>,
    limit: usize,
    find: F,
) -> Result<usize, ChainFailure>
where
    T: Transport + ?Sized,
    F: Fn(&[u8]) -> Option<usize>,
{
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find(pending) {
            return Ok(end);
        }
        if pending.len() >= limit {
            return Err(ChainFailure::BufferOverflow { limit });
        }
        let n = transport.read(&mut chunk).await.map_err(ChainFailure::Io)?;
        if n == 0 {
            return Err(ChainFailure::Eof);
        }
        pending.extend_from_slice(&chunk[..n]);
    }
}

/// End offset of the earliest match of any pattern.
fn find_any(haystack: &[u8], patterns: &[String]) -> Option<usize> {
    patterns
        .iter()
        .filter_map(|p| {
            let needle = p.as_bytes();
            if needle.is_empty() {
                return Some((0, 0));
            }
            haystack
                .windows(needle.len())
                .position(|w| w == needle)
                .map(|start| (start, start + needle.len()))
        })
        .min()
        .map(|(_, end)| end)
}
