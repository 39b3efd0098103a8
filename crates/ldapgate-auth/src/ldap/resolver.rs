//! Identity resolver: username → candidate DNs

use super::connection::{attr_values, ConnectError, DirectoryConnector, DirectorySession};
use super::escape;
use super::types::Rejection;
use ldap3::Scope;
use ldapgate_core::LdapSettings;
use tracing::{debug, error, warn};

/// Outcome of resolving a login name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Username to use for filters downstream. In lookup mode this is the
    /// value of `lookup_dn_user_dn_attribute`.
    pub username: String,

    /// DNs to try binding with, in order
    pub candidates: Vec<String>,
}

/// Result of a lookup-mode directory search
#[derive(Debug, Clone, PartialEq, Eq)]
struct LookedUp {
    name: String,
    entry_dn: String,
}

pub struct IdentityResolver<'a> {
    settings: &'a LdapSettings,
    connector: &'a dyn DirectoryConnector,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(settings: &'a LdapSettings, connector: &'a dyn DirectoryConnector) -> Self {
        Self {
            settings,
            connector,
        }
    }

    pub async fn resolve(&self, username: &str) -> Result<Resolution, Rejection> {
        if !self.settings.lookup_dn && self.settings.bind_dn_templates.is_empty() {
            return Err(Rejection::ConfigurationError(
                "configure lookup_dn or bind_dn_template".to_string(),
            ));
        }

        let (effective, entry_dn) = if self.settings.lookup_dn {
            let found = self.lookup(username).await?;
            (found.name, Some(found.entry_dn))
        } else {
            (username.to_string(), None)
        };

        let candidates: Vec<String> = if self.settings.bind_dn_templates.is_empty() {
            entry_dn
                .into_iter()
                .filter(|dn| {
                    let blank = dn.trim().is_empty();
                    if blank {
                        warn!("Lookup for user '{}' returned an entry without a DN", username);
                    }
                    !blank
                })
                .collect()
        } else {
            let rdn = escape::rdn_value(&effective);
            self.settings
                .bind_dn_templates
                .iter()
                .map(|template| escape::render(template, &[("username", &rdn)]))
                .collect()
        };

        if candidates.is_empty() {
            return Err(Rejection::ResolutionFailure(format!(
                "no bind candidates for '{}'",
                username
            )));
        }

        Ok(Resolution {
            username: effective,
            candidates,
        })
    }

    /// Search the directory for the entry whose login attribute matches
    async fn lookup(&self, username: &str) -> Result<LookedUp, Rejection> {
        let search_user = self.settings.lookup_dn_search_user.as_deref().unwrap_or("");
        let search_password = self
            .settings
            .lookup_dn_search_password
            .as_deref()
            .unwrap_or("");

        let mut session = match self.connector.connect(search_user, search_password).await {
            Ok(session) => session,
            Err(ConnectError::Bind { rc, message }) => {
                warn!(
                    "Failed to bind to LDAP server with search user '{}' (code {}): {}",
                    search_user, rc, message
                );
                return Err(Rejection::ResolutionFailure(
                    "search user bind failed".to_string(),
                ));
            }
            Err(ConnectError::Transport(e)) => {
                error!("LDAP server unreachable during user lookup: {}", e);
                return Err(Rejection::ConnectionFailure(e));
            }
        };

        let result = self.search_login(session.as_mut(), username).await;
        session.close().await;
        result
    }

    async fn search_login(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
    ) -> Result<LookedUp, Rejection> {
        let missing =
            |name: &str| Rejection::ConfigurationError(format!("lookup_dn requires {}", name));
        let base = self
            .settings
            .user_search_base
            .as_deref()
            .ok_or_else(|| missing("user_search_base"))?;
        let login_attr = self
            .settings
            .user_attribute
            .as_deref()
            .ok_or_else(|| missing("user_attribute"))?;
        let dn_attr = self
            .settings
            .lookup_dn_user_dn_attribute
            .as_deref()
            .ok_or_else(|| missing("lookup_dn_user_dn_attribute"))?;

        let login = escape::filter_value(username);
        let filter = escape::render(
            &self.settings.lookup_dn_search_filter,
            &[("login_attr", login_attr), ("login", &login)],
        );

        debug!(
            "Looking up user with search_base='{}' search_filter='{}' attributes=[{}]",
            base, filter, dn_attr
        );

        let entries = session
            .search(base, Scope::Subtree, &filter, &[dn_attr.to_string()])
            .await
            .map_err(|e| Rejection::ResolutionFailure(e.to_string()))?;

        let entry = match entries.as_slice() {
            [] => {
                warn!(
                    "No entry found for user '{}' when looking up attribute '{}'",
                    username, login_attr
                );
                return Err(Rejection::ResolutionFailure("no entry found".to_string()));
            }
            [entry] => entry,
            _ => {
                warn!(
                    "{} entries found for user '{}' with '{}', refusing to pick one",
                    entries.len(),
                    username,
                    login_attr
                );
                return Err(Rejection::ResolutionFailure(format!(
                    "{} entries found",
                    entries.len()
                )));
            }
        };

        let values = attr_values(entry, dn_attr)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| {
                warn!(
                    "Entry '{}' for user '{}' has no '{}' attribute",
                    entry.dn, username, dn_attr
                );
                Rejection::ResolutionFailure(format!("attribute '{}' missing", dn_attr))
            })?;

        if values.len() > 1 {
            warn!(
                "A lookup of the username '{}' returned several values for '{}'. \
                 Only the first ('{}') was used, the others ({}) were ignored.",
                username,
                dn_attr,
                values[0],
                values[1..].join(", ")
            );
        }

        Ok(LookedUp {
            name: values[0].clone(),
            entry_dn: entry.dn.clone(),
        })
    }
}
