//! Directory filter engine
//!
//! Post-bind checks against the user's own bound session: the provisioning
//! search filter, the group membership probe and the auth state attributes.

use super::connection::DirectorySession;
use super::escape;
use super::types::Rejection;
use ldap3::Scope;
use ldapgate_core::LdapSettings;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub struct DirectoryFilter<'a> {
    settings: &'a LdapSettings,
}

impl<'a> DirectoryFilter<'a> {
    pub fn new(settings: &'a LdapSettings) -> Self {
        Self { settings }
    }

    /// Render `search_filter` for a username, if one is configured
    pub fn user_filter(&self, username: &str) -> Option<String> {
        let userattr = self.settings.user_attribute.as_deref().unwrap_or("");
        let escaped = escape::filter_value(username);

        self.settings.search_filter.as_ref().map(|template| {
            escape::render(template, &[("userattr", userattr), ("username", &escaped)])
        })
    }

    /// Render `group_search_filter` for a bound DN and username
    pub fn group_filter(&self, user_dn: &str, username: &str) -> String {
        let userdn = escape::filter_value(user_dn);
        let uid = escape::filter_value(username);

        escape::render(
            &self.settings.group_search_filter,
            &[("userdn", &userdn), ("uid", &uid)],
        )
    }

    /// Require exactly one entry matching `search_filter`
    pub async fn check_search_filter(
        &self,
        session: &mut dyn DirectorySession,
        username: &str,
    ) -> Result<(), Rejection> {
        let Some(filter) = self.user_filter(username) else {
            return Ok(());
        };

        let base = self.settings.user_search_base.as_deref().ok_or_else(|| {
            Rejection::ConfigurationError("search_filter requires user_search_base".to_string())
        })?;
        let userattr = self.settings.user_attribute.as_deref().unwrap_or("");

        debug!("Checking search filter '{}' under '{}'", filter, base);

        let entries = session
            .search(base, Scope::Subtree, &filter, &self.settings.attributes)
            .await
            .map_err(|e| Rejection::ProvisioningMismatch(e.to_string()))?;

        match entries.len() {
            0 => {
                warn!(
                    "User with '{}={}' not found in directory",
                    userattr, username
                );
                Err(Rejection::ProvisioningMismatch(
                    "no entry matches search_filter".to_string(),
                ))
            }
            1 => Ok(()),
            n => {
                warn!(
                    "Duplicate users found! {} users found with '{}={}'",
                    n, userattr, username
                );
                Err(Rejection::ProvisioningMismatch(format!(
                    "{} entries match search_filter",
                    n
                )))
            }
        }
    }

    /// Return the first allowed group the user belongs to.
    ///
    /// Probing stops at the first match, so the result holds at most one
    /// group. A group whose probe fails is treated as a non-match.
    pub async fn probe_groups(
        &self,
        session: &mut dyn DirectorySession,
        user_dn: &str,
        username: &str,
    ) -> Result<Vec<String>, Rejection> {
        if self.settings.allowed_groups.is_empty() {
            return Ok(Vec::new());
        }

        if self.settings.group_search_filter.is_empty() || self.settings.group_attributes.is_empty()
        {
            warn!("Missing group_search_filter or group_attributes. Both are required.");
            return Err(Rejection::ConfigurationError(
                "allowed_groups requires group_search_filter and group_attributes".to_string(),
            ));
        }

        debug!("username:{} Using dn {}", username, user_dn);
        let filter = self.group_filter(user_dn, username);

        for group in &self.settings.allowed_groups {
            match session
                .search(group, Scope::Base, &filter, &self.settings.group_attributes)
                .await
            {
                Ok(entries) if !entries.is_empty() => {
                    debug!("username:{} is a member of {}", username, group);
                    return Ok(vec![group.clone()]);
                }
                Ok(_) => {}
                Err(e) => debug!("Membership probe of {} failed: {}", group, e),
            }
        }

        Ok(Vec::new())
    }

    /// Fetch `auth_state_attributes` from the user's own entry
    pub async fn user_attributes(
        &self,
        session: &mut dyn DirectorySession,
        user_dn: &str,
    ) -> BTreeMap<String, Vec<String>> {
        if self.settings.auth_state_attributes.is_empty() {
            return BTreeMap::new();
        }

        match session
            .search(
                user_dn,
                Scope::Base,
                "(objectClass=*)",
                &self.settings.auth_state_attributes,
            )
            .await
        {
            Ok(entries) => entries
                .into_iter()
                .next()
                .map(|entry| entry.attrs.into_iter().collect())
                .unwrap_or_default(),
            Err(e) => {
                warn!("Could not read attributes of {}: {}", user_dn, e);
                BTreeMap::new()
            }
        }
    }
}
