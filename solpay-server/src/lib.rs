//! Transaction-request server and command-line payer.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`util`] - Shutdown signals and key pair loading

pub mod config;
pub mod util;
