//! Redis-compatible store client speaking RESP2 over one TCP connection.
//!
//! # Design Decisions
//! - Connection opened lazily on first command
//! - Commands are serialized through a mutex; each request fetches keys
//!   sequentially anyway
//! - An I/O or protocol error drops the connection; the next command
//!   reconnects. Nothing is retried.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::collaborators::store::KeyValueStore;
use crate::error::StoreError;

/// Largest bulk string a Redis server will send (512 MiB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Largest aggregate a Redis server will send.
const MAX_ARRAY_LEN: i64 = u32::MAX as i64;
/// Upper bound on memory reserved before the data actually arrives.
const PREALLOC_LIMIT: usize = 1024;

/// Decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R>(reader: &mut R) -> Result<String, StoreError>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(StoreError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    match line.strip_suffix("\r\n") {
        Some(stripped) => Ok(stripped.to_string()),
        None => Err(StoreError::Protocol(format!("unterminated line {:?}", line))),
    }
}

fn parse_len(raw: &str) -> Result<i64, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Protocol(format!("invalid length {:?}", raw)))
}

/// Read one reply, recursing into arrays.
pub fn read_reply<'a, R>(reader: &'a mut R) -> BoxFuture<'a, Result<Reply, StoreError>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(&mut *reader).await?;
        let mut chars = line.chars();
        let tag = chars.next();
        let rest = chars.as_str();

        match tag {
            Some('+') => Ok(Reply::Status(rest.to_string())),
            Some('-') => Ok(Reply::Error(rest.to_string())),
            Some(':') => Ok(Reply::Integer(parse_len(rest)?)),
            Some('$') => {
                let len = parse_len(rest)?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                if len > MAX_BULK_LEN {
                    return Err(StoreError::Protocol(format!("bulk length {} too large", len)));
                }
                let want = len as usize + 2;
                let mut buf = Vec::with_capacity(want.min(PREALLOC_LIMIT));
                (&mut *reader).take(want as u64).read_to_end(&mut buf).await?;
                if buf.len() < want {
                    return Err(StoreError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                if !buf.ends_with(b"\r\n") {
                    return Err(StoreError::Protocol("bulk string missing CRLF".into()));
                }
                buf.truncate(len as usize);
                Ok(Reply::Bulk(Some(buf)))
            }
            Some('*') => {
                let len = parse_len(rest)?;
                if len < 0 {
                    return Ok(Reply::Array(None));
                }
                if len > MAX_ARRAY_LEN {
                    return Err(StoreError::Protocol(format!("array length {} too large", len)));
                }
                let mut items = Vec::with_capacity((len as usize).min(PREALLOC_LIMIT));
                for _ in 0..len {
                    items.push(read_reply(&mut *reader).await?);
                }
                Ok(Reply::Array(Some(items)))
            }
            _ => Err(StoreError::Protocol(format!("unknown reply {:?}", line))),
        }
    })
}

fn into_string(bytes: Vec<u8>) -> Result<String, StoreError> {
    String::from_utf8(bytes).map_err(|_| StoreError::Protocol("value is not UTF-8".into()))
}

fn unexpected(reply: Reply) -> StoreError {
    match reply {
        Reply::Error(msg) => StoreError::Server(msg),
        other => StoreError::Protocol(format!("unexpected reply {:?}", other)),
    }
}

/// Store backed by a Redis-compatible server.
pub struct RedisStore {
    address: String,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl RedisStore {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn command(&self, args: &[&str]) -> Result<Reply, StoreError> {
        let mut guard = self.conn.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => {
                let stream = TcpStream::connect(&self.address).await?;
                stream.set_nodelay(true)?;
                tracing::debug!(address = %self.address, "Connected to store");
                BufStream::new(stream)
            }
        };

        let result: Result<Reply, StoreError> = async {
            conn.write_all(&encode_command(args)).await?;
            conn.flush().await?;
            read_reply(&mut conn).await
        }
        .await;

        match result {
            Ok(reply) => {
                *guard = Some(conn);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(address = %self.address, error = %e, "Store connection dropped");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        match self.command(&["KEYS", pattern]).await? {
            Reply::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    Reply::Bulk(Some(bytes)) => into_string(bytes),
                    other => Err(unexpected(other)),
                })
                .collect(),
            Reply::Array(None) => Ok(Vec::new()),
            other => Err(unexpected(other)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.command(&["GET", key]).await? {
            Reply::Bulk(Some(bytes)) => into_string(bytes).map(Some),
            Reply::Bulk(None) => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self.command(&["SET", key, value]).await? {
            Reply::Status(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
