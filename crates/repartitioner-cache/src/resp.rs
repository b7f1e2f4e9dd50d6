//! RESP2 cache client.
//!
//! Speaks just enough of the Redis serialization protocol to issue `GET`,
//! `SET` and `PING` over one TCP connection.
//!
//! # Wire format
//!
//! ```text
//! Client → Server:
//!   *2\r\n$3\r\nGET\r\n$3\r\nABC\r\n      (array of bulk strings)
//!
//! Server → Client:
//!   $3\r\n123\r\n                         (bulk string)
//!   $-1\r\n                               (null bulk: key absent)
//!   +OK\r\n                               (simple string)
//!   -ERR message\r\n                      (error)
//! ```
//!
//! The connection is opened on first use and dropped after any I/O or
//! protocol fault; the next call reconnects.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::client::CacheClient;
use crate::error::{CacheError, CacheResult};

/// Longest bulk string accepted from the server.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array element count accepted from the server.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Upper bound on up-front allocation for an array reply.
const ARRAY_PREALLOC: usize = 16;

/// A decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn command(&mut self, args: &[&[u8]]) -> CacheResult<Reply> {
        self.writer.write_all(&encode_command(args))?;
        self.writer.flush()?;
        read_reply(&mut self.reader)
    }
}

/// Cache client for Redis-compatible servers.
pub struct RespCache {
    address: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RespCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespCache")
            .field("address", &self.address)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl RespCache {
    /// Create a client for `address` (`host:port`). No connection is made yet.
    pub fn new(address: impl Into<String>, connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            io_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn connect(&self) -> CacheResult<Connection> {
        let connect_err = |message: String| CacheError::Connect {
            address: self.address.clone(),
            message,
        };

        let addrs: Vec<_> = self
            .address
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("dns resolution failed: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(connect_err("no address found".to_string()));
        }

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    let _ = stream.set_nodelay(true);
                    let writer = stream.try_clone()?;
                    debug!(address = %self.address, %addr, "cache connection established");
                    return Ok(Connection {
                        reader: BufReader::new(stream),
                        writer,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(connect_err(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    fn execute(&self, args: &[&[u8]]) -> CacheResult<Reply> {
        let mut guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard.as_mut().ok_or(CacheError::Poisoned)?;

        let result = conn.command(args);
        if let Err(e) = &result {
            if e.is_connection_fault() {
                debug!(address = %self.address, error = %e, "dropping cache connection");
                *guard = None;
            }
        }
        result
    }
}

impl CacheClient for RespCache {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.execute(&[b"GET", key.as_bytes()])? {
            Reply::Bulk(None) => Ok(None),
            Reply::Bulk(Some(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| CacheError::Protocol(format!("GET {key}: non-utf8 value: {e}"))),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("GET", &other)),
        }
    }

    fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        match self.execute(&[b"SET", key.as_bytes(), value.as_bytes()])? {
            Reply::Simple(s) if s == "OK" => Ok(()),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Send `PING` and expect `+PONG`.
    fn ping(&self) -> CacheResult<()> {
        match self.execute(&[b"PING"])? {
            Reply::Simple(s) if s == "PONG" => Ok(()),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("PING", &other)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "resp"
    }
}

fn unexpected(command: &str, reply: &Reply) -> CacheError {
    match reply {
        Reply::Error(msg) => CacheError::Server(msg.clone()),
        other => CacheError::Protocol(format!("unexpected reply to {command}: {other:?}")),
    }
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read one complete reply from `reader`.
pub fn read_reply<R: BufRead>(reader: &mut R) -> CacheResult<Reply> {
    let line = read_line(reader)?;
    let (tag, rest) = line
        .split_first()
        .ok_or_else(|| CacheError::Protocol("empty reply line".to_string()))?;
    let text = || String::from_utf8_lossy(rest).into_owned();

    match tag {
        b'+' => Ok(Reply::Simple(text())),
        b'-' => Ok(Reply::Error(text())),
        b':' => Ok(Reply::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            let len = len as usize;
            if len > MAX_BULK_LEN {
                return Err(CacheError::Protocol(format!("bulk length {len} too large")));
            }
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf)?;
            if &buf[len..] != b"\r\n" {
                return Err(CacheError::Protocol("bulk string not CRLF terminated".to_string()));
            }
            buf.truncate(len);
            Ok(Reply::Bulk(Some(buf)))
        }
        b'*' => {
            let count = parse_int(rest)?;
            if count < 0 {
                return Ok(Reply::Array(None));
            }
            let count = count as usize;
            if count > MAX_ARRAY_LEN {
                return Err(CacheError::Protocol(format!("array length {count} too large")));
            }
            let mut items = Vec::with_capacity(count.min(ARRAY_PREALLOC));
            for _ in 0..count {
                items.push(read_reply(reader)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        other => Err(CacheError::Protocol(format!(
            "unknown reply type byte {:?}",
            *other as char
        ))),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> CacheResult<Vec<u8>> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(CacheError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "cache server closed the connection",
        )));
    }
    if !line.ends_with(b"\r\n") {
        return Err(CacheError::Protocol("reply line not CRLF terminated".to_string()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_int(bytes: &[u8]) -> CacheResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            CacheError::Protocol(format!("invalid integer {:?}", String::from_utf8_lossy(bytes)))
        })
}
