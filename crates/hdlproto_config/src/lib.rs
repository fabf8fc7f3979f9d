//! Parsing and validation of `hdlproto.toml` simulation configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`FileConfig`]. Signal paths inside it (such as the clock) stay as strings;
//! the simulator resolves them against the built design.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
