//! Request/response client over a RouterOS API stream.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::ApiError;
use super::codec::{Reply, ReplyKind, encode_sentence, read_sentence};

/// One `!re` reply as key/value pairs.
pub type Record = HashMap<String, String>;

pub struct ApiClient<S> {
    stream: S,
    timeout: Duration,
}

/// Open a TCP connection to the API port within `timeout`.
pub async fn connect(address: &str, timeout: Duration) -> Result<ApiClient<TcpStream>, ApiError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| ApiError::Timeout)?
        .map_err(ApiError::Connect)?;
    stream.set_nodelay(true).map_err(ApiError::Connect)?;
    Ok(ApiClient::new(stream, timeout))
}

impl<S> ApiClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    /// Plain-text login (RouterOS 6.43 and later).
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ApiError> {
        let name = format!("=name={username}");
        let pass = format!("=password={password}");
        match self.run("/login", &[name.as_str(), pass.as_str()]).await {
            Ok(_) => Ok(()),
            Err(ApiError::Trap(message)) => Err(ApiError::Login(message)),
            Err(e) => Err(e),
        }
    }

    /// Send `command` with extra words and collect every `!re` until `!done`.
    ///
    /// A `!trap` is reported after the trailing `!done` has been consumed so
    /// the stream stays usable.
    pub async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, ApiError> {
        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(command);
        words.extend_from_slice(args);

        debug!(command, args = args.len(), "api request");
        let frame = encode_sentence(&words);
        let stream = &mut self.stream;
        deadline(self.timeout, async {
            stream.write_all(&frame).await.map_err(ApiError::Io)?;
            stream.flush().await.map_err(ApiError::Io)
        })
        .await?;

        let mut records = Vec::new();
        let mut trap = None;
        loop {
            let sentence = deadline(self.timeout, read_sentence(&mut self.stream)).await?;
            let reply = Reply::parse(sentence)?;
            match reply.kind {
                ReplyKind::Re => records.push(reply.attributes),
                ReplyKind::Trap => trap = Some(reply.message()),
                ReplyKind::Fatal => return Err(ApiError::Fatal(reply.message())),
                ReplyKind::Done => break,
            }
        }

        match trap {
            Some(message) => Err(ApiError::Trap(message)),
            None => Ok(records),
        }
    }
}

async fn deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ApiError::Timeout)?
}
