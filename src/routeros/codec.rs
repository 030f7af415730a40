//! RouterOS API wire format.
//!
//! A sentence is a sequence of words terminated by an empty word. Each word
//! is prefixed by its length in a variable 1 to 5 byte encoding.

use std::collections::HashMap;
use std::str::FromStr;

use strum_macros::{AsRefStr, Display, EnumString};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::routeros::ApiError;

/// Largest word accepted from a device.
pub const MAX_WORD_LEN: usize = 1024 * 1024;

/// Append the length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    let n = len as u32;
    match len {
        0..0x80 => out.push(n as u8),
        0x80..0x4000 => out.extend_from_slice(&(n | 0x8000).to_be_bytes()[2..]),
        0x4000..0x20_0000 => out.extend_from_slice(&(n | 0xC0_0000).to_be_bytes()[1..]),
        0x20_0000..0x1000_0000 => out.extend_from_slice(&(n | 0xE000_0000).to_be_bytes()),
        _ => {
            out.push(0xF0);
            out.extend_from_slice(&n.to_be_bytes());
        }
    }
}

/// Encode a full sentence including the terminating empty word.
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        let word = word.as_ref().as_bytes();
        encode_length(word.len(), &mut out);
        out.extend_from_slice(word);
    }
    out.push(0);
    out
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize, ApiError> {
    let first = reader.read_u8().await.map_err(ApiError::from_read)?;
    let (extra, head) = match first {
        b if b & 0x80 == 0x00 => (0, u32::from(b)),
        b if b & 0xC0 == 0x80 => (1, u32::from(b & 0x3F)),
        b if b & 0xE0 == 0xC0 => (2, u32::from(b & 0x1F)),
        b if b & 0xF0 == 0xE0 => (3, u32::from(b & 0x0F)),
        0xF0 => (4, 0),
        b => return Err(ApiError::Protocol(format!("invalid length prefix 0x{b:02x}"))),
    };

    let mut len = head;
    for _ in 0..extra {
        let b = reader.read_u8().await.map_err(ApiError::from_read)?;
        len = (len << 8) | u32::from(b);
    }
    Ok(len as usize)
}

/// Read one word; an empty word ends a sentence.
pub async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, ApiError> {
    let len = read_length(reader).await?;
    if len > MAX_WORD_LEN {
        return Err(ApiError::Protocol(format!(
            "word of {len} bytes exceeds {MAX_WORD_LEN}"
        )));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ApiError::from_read)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read words up to the terminating empty word.
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>, ApiError> {
    let mut words = Vec::new();
    loop {
        let word = read_word(reader).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

// =============================================================================
// Replies
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
pub enum ReplyKind {
    #[strum(serialize = "!re")]
    Re,
    #[strum(serialize = "!done")]
    Done,
    #[strum(serialize = "!trap")]
    Trap,
    #[strum(serialize = "!fatal")]
    Fatal,
}

/// A parsed reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    /// `=key=value` words.
    pub attributes: HashMap<String, String>,
    /// Free words after the reply word (the reason of `!fatal`).
    pub words: Vec<String>,
}

impl Reply {
    pub fn parse(sentence: Vec<String>) -> Result<Self, ApiError> {
        let mut words = sentence.into_iter();
        let head = words
            .next()
            .ok_or_else(|| ApiError::Protocol("empty reply".to_string()))?;
        let kind = ReplyKind::from_str(&head)
            .map_err(|_| ApiError::Protocol(format!("unknown reply word {head}")))?;

        let mut reply = Self {
            kind,
            attributes: HashMap::new(),
            words: Vec::new(),
        };
        for word in words {
            if let Some(pair) = word.strip_prefix('=') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                reply.attributes.insert(key.to_string(), value.to_string());
            } else if !word.starts_with(".tag=") {
                reply.words.push(word);
            }
        }
        Ok(reply)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// `message` attribute of a trap, or the first free word of a fatal.
    pub fn message(&self) -> String {
        self.get("message")
            .map(str::to_string)
            .or_else(|| self.words.first().cloned())
            .unwrap_or_default()
    }
}
