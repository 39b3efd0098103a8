//! Core types for Ldapgate

mod identity;
mod transport;

pub use identity::*;
pub use transport::*;
