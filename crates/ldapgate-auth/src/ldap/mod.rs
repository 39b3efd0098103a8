//! LDAP authentication engine
//!
//! Flow of a login:
//! - username → candidate DNs (templates and/or directory lookup)
//! - bind against candidates in order, first success wins
//! - post-bind search filter and group membership probe
//! - allow-list policy decides the verdict

mod authenticator;
mod authorize;
mod bind;
mod connection;
pub mod escape;
mod filter;
mod resolver;
mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use authenticator::LdapAuthenticator;
pub use authorize::{decide, AllowAuthenticated, HostPolicy};
pub use bind::{AttemptStatus, BindAttempt, BindEngine, BindOutcome, BoundSession};
pub use connection::{
    ConnectError, DirectoryConnector, DirectoryError, DirectorySession, LdapConnector,
};
pub use filter::DirectoryFilter;
pub use resolver::{IdentityResolver, Resolution};
pub use types::Rejection;
