//! Identity types handed back to the host framework

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Authorization metadata gathered while authenticating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// Allowed groups the user was found to be a member of.
    /// Probing stops at the first match, so this holds at most one group.
    #[serde(default)]
    pub ldap_groups: Vec<String>,

    /// Attributes requested through `auth_state_attributes`
    #[serde(default)]
    pub user_attributes: BTreeMap<String, Vec<String>>,
}

impl AuthState {
    pub fn in_group(&self, group: &str) -> bool {
        self.ldap_groups.iter().any(|g| g == group)
    }
}

/// A successfully authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Effective username
    pub name: String,

    /// DN the bind succeeded with
    #[serde(skip)]
    pub dn: String,

    pub auth_state: AuthState,
}
