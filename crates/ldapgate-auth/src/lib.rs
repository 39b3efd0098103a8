//! Directory authentication for Ldapgate
//!
//! Verifies a username/password pair against an LDAP directory and decides
//! whether the resulting identity may use the downstream application.

pub mod ldap;

pub use ldap::{
    AllowAuthenticated, AttemptStatus, BindAttempt, BindEngine, BindOutcome, ConnectError,
    DirectoryConnector, DirectoryError, DirectoryFilter, DirectorySession, HostPolicy,
    IdentityResolver, LdapAuthenticator, LdapConnector, Rejection, Resolution,
};
pub use ldapgate_core::types::{AuthState, AuthenticatedUser};
