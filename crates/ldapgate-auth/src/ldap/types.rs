//! Rejection reasons
//!
//! Every variant collapses to a plain "rejected" for the host framework.
//! The detail only ever reaches the operator log.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Username failed validation or the password was blank
    #[error("input rejected: {0}")]
    InputRejected(String),

    /// The directory could not be reached
    #[error("directory unreachable: {0}")]
    ConnectionFailure(String),

    /// No candidate DN accepted the password
    #[error("invalid credentials")]
    BindFailure,

    /// The username could not be turned into a DN
    #[error("identity resolution failed: {0}")]
    ResolutionFailure(String),

    /// Bound, but the post-bind search filter did not find exactly one entry
    #[error("provisioning mismatch: {0}")]
    ProvisioningMismatch(String),

    /// An allow rule is missing its companion settings
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::InputRejected(_) => "input_rejected",
            Rejection::ConnectionFailure(_) => "connection_failure",
            Rejection::BindFailure => "bind_failure",
            Rejection::ResolutionFailure(_) => "resolution_failure",
            Rejection::ProvisioningMismatch(_) => "provisioning_mismatch",
            Rejection::ConfigurationError(_) => "configuration_error",
        }
    }
}
