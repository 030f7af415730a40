//! Byte transports for telnet sessions.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bidirectional byte stream under a session.
///
/// Deadlines are applied by the session, not the transport.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Read available bytes into `buf`. `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens transports; a session keeps its connector to reconnect.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self, address: &str) -> io::Result<Self::Transport>;
}

// =============================================================================
// TCP
// =============================================================================

/// Connects plain TCP telnet transports.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait::async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, address: &str) -> io::Result<TcpTransport> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(TcpTransport::new(stream))
    }
}

/// Telnet over TCP. Option negotiation is answered with a refusal and
/// removed from the data stream.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    filter: IacFilter,
    decoded: VecDeque<u8>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            filter: IacFilter::default(),
            decoded: VecDeque::new(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut raw = [0u8; 4096];
        while self.decoded.is_empty() {
            let n = self.stream.read(&mut raw).await?;
            if n == 0 {
                return Ok(0);
            }

            let mut data = Vec::with_capacity(n);
            let mut replies = Vec::new();
            self.filter.feed(&raw[..n], &mut data, &mut replies);
            if !replies.is_empty() {
                self.stream.write_all(&replies).await?;
            }
            self.decoded.extend(data);
        }

        let n = buf.len().min(self.decoded.len());
        for (slot, byte) in buf.iter_mut().zip(self.decoded.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        // a literal 0xff must be doubled on the wire
        if data.contains(&IAC) {
            let mut escaped = Vec::with_capacity(data.len() + 1);
            for &b in data {
                escaped.push(b);
                if b == IAC {
                    escaped.push(IAC);
                }
            }
            self.stream.write_all(&escaped).await
        } else {
            self.stream.write_all(data).await
        }
    }
}

// =============================================================================
// Option negotiation
// =============================================================================

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    #[default]
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Incremental IAC stripper. Keeps state across reads so a command split
/// between two segments is still recognised.
#[derive(Debug, Default)]
struct IacFilter {
    state: FilterState,
}

impl IacFilter {
    fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &b in input {
            self.state = match (self.state, b) {
                (FilterState::Data, IAC) => FilterState::Iac,
                (FilterState::Data, _) => {
                    data.push(b);
                    FilterState::Data
                }
                (FilterState::Iac, IAC) => {
                    data.push(IAC);
                    FilterState::Data
                }
                (FilterState::Iac, DO | DONT | WILL | WONT) => FilterState::Option(b),
                (FilterState::Iac, SB) => FilterState::Sub,
                (FilterState::Iac, _) => FilterState::Data,
                (FilterState::Option(cmd), opt) => {
                    match cmd {
                        DO => replies.extend_from_slice(&[IAC, WONT, opt]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, opt]),
                        _ => {}
                    }
                    FilterState::Data
                }
                (FilterState::Sub, IAC) => FilterState::SubIac,
                (FilterState::Sub, _) => FilterState::Sub,
                (FilterState::SubIac, SE) => FilterState::Data,
                (FilterState::SubIac, _) => FilterState::Sub,
            };
        }
    }
}
