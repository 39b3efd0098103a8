//! Directory connection factory
//!
//! Opens a per-attempt connection to the directory with the configured TLS
//! behavior and binds it. Sessions are scoped: whoever opens one must call
//! [`DirectorySession::close`] on every exit path.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use ldapgate_core::types::DirectoryEndpoint;
use ldapgate_core::LdapSettings;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// LDAP result code for a search base that does not exist
const RC_NO_SUCH_OBJECT: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// Server unreachable, TLS handshake failed or the request timed out
    #[error("directory unreachable: {0}")]
    Transport(String),

    /// The server answered the bind with a non-success result code
    #[error("bind rejected with code {rc}: {message}")]
    Bind { rc: u32, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("directory search failed: {0}")]
pub struct DirectoryError(pub String);

/// An open, possibly bound, directory connection
#[async_trait]
pub trait DirectorySession: Send {
    /// Search and return the matching entries. A missing search base yields
    /// no entries rather than an error.
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<SearchEntry>, DirectoryError>;

    /// Unbind and release the connection
    async fn close(self: Box<Self>);
}

/// Opens directory sessions
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connect and bind as `dn`. An empty `dn` leaves the session anonymous.
    async fn connect(
        &self,
        dn: &str,
        password: &str,
    ) -> Result<Box<dyn DirectorySession>, ConnectError>;
}

/// [`DirectoryConnector`] backed by a real LDAP server
#[derive(Debug, Clone)]
pub struct LdapConnector {
    endpoint: DirectoryEndpoint,
    skip_tls_verify: bool,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl LdapConnector {
    pub fn new(settings: &LdapSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            skip_tls_verify: settings.skip_tls_verify,
            connect_timeout: settings.connect_timeout,
            operation_timeout: settings.operation_timeout,
        }
    }

    fn conn_settings(&self) -> LdapConnSettings {
        let transport = self.endpoint.transport();

        LdapConnSettings::new()
            .set_conn_timeout(self.connect_timeout)
            .set_starttls(transport.tls_before_bind)
            .set_no_tls_verify(self.skip_tls_verify)
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(
        &self,
        dn: &str,
        password: &str,
    ) -> Result<Box<dyn DirectorySession>, ConnectError> {
        let url = self.endpoint.url();
        debug!(
            "Connecting to LDAP server: {} (tls_strategy={})",
            url, self.endpoint.tls_strategy
        );

        let (conn, mut ldap) = LdapConnAsync::with_settings(self.conn_settings(), &url)
            .await
            .map_err(|e| ConnectError::Transport(format!("Failed to connect to {}: {}", url, e)))?;

        ldap3::drive!(conn);

        if !dn.is_empty() {
            let result = ldap
                .with_timeout(self.operation_timeout)
                .simple_bind(dn, password)
                .await
                .map_err(|e| ConnectError::Transport(format!("Bind request failed: {}", e)))?;

            if result.rc != 0 {
                if let Err(e) = ldap.with_timeout(self.operation_timeout).unbind().await {
                    debug!("LDAP unbind after rejected bind failed: {}", e);
                }
                return Err(ConnectError::Bind {
                    rc: result.rc,
                    message: result.text,
                });
            }
        }

        Ok(Box::new(LdapSession {
            ldap,
            timeout: self.operation_timeout,
        }))
    }
}

struct LdapSession {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
        attrs: &[String],
    ) -> Result<Vec<SearchEntry>, DirectoryError> {
        let SearchResult(rs, res) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(|e| DirectoryError(format!("Search under '{}' failed: {}", base, e)))?;

        match res.rc {
            0 => Ok(rs.into_iter().map(SearchEntry::construct).collect()),
            RC_NO_SUCH_OBJECT => Ok(Vec::new()),
            rc => Err(DirectoryError(format!(
                "Search under '{}' returned code {}: {}",
                base, rc, res.text
            ))),
        }
    }

    async fn close(self: Box<Self>) {
        let LdapSession { mut ldap, timeout } = *self;
        if let Err(e) = ldap.with_timeout(timeout).unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
    }
}

/// Values of an attribute, matching the name case-insensitively
pub(crate) fn attr_values<'a>(entry: &'a SearchEntry, attr: &str) -> Option<&'a Vec<String>> {
    entry.attrs.get(attr).or_else(|| {
        entry
            .attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values)
    })
}
