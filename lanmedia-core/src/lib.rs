//! lanmedia core library: runtime configuration, options parsing, errors.
//!
//! Public API surface:
//! - [`types`]: [`RuntimeConfig`] and the value types it is built from
//! - [`config`]: options file parser and the command-line merge
//! - [`identity`]: host-derived defaults (friendly name, uuid, address)
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::{ConfigBuilder, Overrides};
pub use error::ConfigError;
pub use types::{
    ContentFilter, DeviceIdentity, LanAddr, MediaDir, MediaKind, RescanMode, RuntimeConfig,
    UptimeSource,
};
