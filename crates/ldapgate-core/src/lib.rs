//! Ldapgate Core Library
//!
//! Configuration, error types and shared identity types for the ldapgate
//! directory authenticator.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LdapConfigSection, LdapSettings, LdapgateConfig};
pub use error::{Error, Result};

/// Ldapgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default plaintext / StartTLS LDAP port
pub const LDAP_PORT: u16 = 389;

/// Default LDAPS port
pub const LDAPS_PORT: u16 = 636;

/// Default username validation pattern
pub const DEFAULT_USERNAME_REGEX: &str = r"^[a-z][.a-z0-9_-]*$";

/// Default connect and per-operation timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
