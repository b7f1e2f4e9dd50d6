//! repartitioner-core: types and configuration shared by every crate.
//!
//! Holds the stream record and lifecycle types, the `RuntimeHandle` seam
//! between stream runtimes and health checking, TOML configuration, and
//! duration parsing/formatting (`3m`, `180s`, `PT3M`).

pub mod config;
pub mod duration;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::RepartitionerConfig;
pub use duration::{format_iso8601, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use runtime::{InstanceProvider, RuntimeHandle};
pub use types::*;
