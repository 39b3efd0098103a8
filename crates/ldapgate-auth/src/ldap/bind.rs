//! Bind engine: try candidate DNs in order until one accepts the password

use super::connection::{ConnectError, DirectoryConnector, DirectorySession};
use super::types::Rejection;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Bound,
    Rejected { rc: u32 },
    Unreachable,
    /// Blank DN, never sent to the directory since it would bind anonymously
    Skipped,
}

/// Diagnostics for one bind attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAttempt {
    pub dn: String,
    pub status: AttemptStatus,
}

/// A session bound as `dn`
pub struct BoundSession {
    pub dn: String,
    pub session: Box<dyn DirectorySession>,
}

pub struct BindOutcome {
    pub bound: Option<BoundSession>,
    pub attempts: Vec<BindAttempt>,
}

impl BindOutcome {
    /// Collapse to the bound session or a rejection
    pub fn into_result(self) -> Result<BoundSession, Rejection> {
        match self.bound {
            Some(bound) => Ok(bound),
            None => match self.attempts.last() {
                Some(BindAttempt {
                    status: AttemptStatus::Unreachable,
                    ..
                }) => Err(Rejection::ConnectionFailure(
                    "directory unreachable during bind".to_string(),
                )),
                Some(_) => Err(Rejection::BindFailure),
                None => Err(Rejection::ResolutionFailure(
                    "no bind candidates".to_string(),
                )),
            },
        }
    }
}

pub struct BindEngine<'a> {
    connector: &'a dyn DirectoryConnector,
}

impl<'a> BindEngine<'a> {
    pub fn new(connector: &'a dyn DirectoryConnector) -> Self {
        Self { connector }
    }

    /// Bind with each candidate in order, stopping at the first success.
    ///
    /// A rejected bind moves on to the next candidate. An unreachable
    /// directory ends the loop since every later candidate would fail the
    /// same way.
    pub async fn bind(&self, username: &str, password: &str, candidates: &[String]) -> BindOutcome {
        let mut attempts = Vec::with_capacity(candidates.len());

        for dn in candidates {
            if dn.trim().is_empty() {
                warn!("Refusing to bind {} with a blank DN", username);
                attempts.push(BindAttempt {
                    dn: dn.clone(),
                    status: AttemptStatus::Skipped,
                });
                continue;
            }

            debug!("Attempting to bind {} with {}", username, dn);

            match self.connector.connect(dn, password).await {
                Ok(session) => {
                    debug!("Status of user bind {} with {}: bound", username, dn);
                    attempts.push(BindAttempt {
                        dn: dn.clone(),
                        status: AttemptStatus::Bound,
                    });
                    return BindOutcome {
                        bound: Some(BoundSession {
                            dn: dn.clone(),
                            session,
                        }),
                        attempts,
                    };
                }
                Err(ConnectError::Bind { rc, message }) => {
                    debug!(
                        "Status of user bind {} with {}: rejected (code {}): {}",
                        username, dn, rc, message
                    );
                    attempts.push(BindAttempt {
                        dn: dn.clone(),
                        status: AttemptStatus::Rejected { rc },
                    });
                }
                Err(ConnectError::Transport(e)) => {
                    error!("LDAP server unreachable while binding {}: {}", dn, e);
                    attempts.push(BindAttempt {
                        dn: dn.clone(),
                        status: AttemptStatus::Unreachable,
                    });
                    break;
                }
            }
        }

        if !attempts.is_empty() {
            warn!("Invalid password for user '{}'", username);
        }

        BindOutcome {
            bound: None,
            attempts,
        }
    }
}
