//! repartitioner-cache: key/value cache clients.
//!
//! The rekey stage only needs `get` and `set`; no transactional guarantees
//! are assumed. Two clients are provided:
//!
//! - [`MemoryCache`]: in-process concurrent map, used standalone and in tests.
//! - [`RespCache`]: talks to a Redis-compatible server over the RESP2 wire
//!   protocol on a single lazily (re)connected TCP connection.

pub mod client;
pub mod error;
pub mod resp;

pub use client::{CacheClient, MemoryCache};
pub use error::{CacheError, CacheResult};
pub use resp::RespCache;

use std::sync::Arc;

use repartitioner_core::config::{CacheBackend, CacheConfig};

/// Build the cache client selected by `config.backend`.
///
/// The RESP client connects lazily, so an unreachable server surfaces as
/// per-record cache errors rather than a startup failure.
pub fn from_config(config: &CacheConfig) -> repartitioner_core::ConfigResult<Arc<dyn CacheClient>> {
    let client: Arc<dyn CacheClient> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Resp => Arc::new(RespCache::new(
            config.address.clone(),
            config.connect_timeout()?,
            config.io_timeout()?,
        )),
    };
    Ok(client)
}
