//! Authorization decision
//!
//! Pure function over the configured allow rules and the auth state
//! gathered at login. Never contacts the directory.

use ldapgate_core::types::AuthState;
use ldapgate_core::LdapSettings;
use tracing::{debug, warn};

/// Policy hooks owned by the host authentication framework
pub trait HostPolicy: Send + Sync {
    /// Verdict when no local allow rule is configured
    fn baseline(&self, username: &str, auth_state: Option<&AuthState>) -> bool;

    /// Host-level rules that grant access regardless of local rules
    fn grants(&self, _username: &str, _auth_state: Option<&AuthState>) -> bool {
        false
    }
}

/// Default host policy: any directory-authenticated identity is allowed
/// when nothing narrower is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAuthenticated;

impl HostPolicy for AllowAuthenticated {
    fn baseline(&self, _username: &str, _auth_state: Option<&AuthState>) -> bool {
        true
    }
}

/// Decide whether `username` may use the application
pub fn decide(
    settings: &LdapSettings,
    host: &dyn HostPolicy,
    username: &str,
    auth_state: Option<&AuthState>,
) -> bool {
    if !settings.has_allow_rules() {
        return host.baseline(username, auth_state);
    }

    if settings.allow_all || host.grants(username, auth_state) {
        return true;
    }

    if settings.allowed_users.contains(username) {
        debug!("Allowing {} as a listed user", username);
        return true;
    }

    if let Some(state) = auth_state {
        if let Some(group) = settings
            .allowed_groups
            .iter()
            .find(|group| state.in_group(group))
        {
            debug!("Allowing {} as member of group {}", username, group);
            return true;
        }
    }

    if let Some(filter) = &settings.search_filter {
        warn!(
            "User {} matches search_filter {}, but not allowed by allowed_users, \
             allowed_groups, or allow_all.",
            username, filter
        );
    }

    false
}
