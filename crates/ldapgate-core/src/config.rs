//! Configuration for Ldapgate
//!
//! [`LdapConfigSection`] is the raw, serde-facing option surface. It is
//! resolved once at startup into [`LdapSettings`], the immutable settings
//! the authenticator runs on. Deprecated options are folded into their
//! replacements during that step.

use crate::types::{DirectoryEndpoint, TlsStrategy};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LdapgateConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ldap: LdapConfigSection,
}

impl LdapgateConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::ConfigRead {
            path: path.to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_env() -> crate::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = var("LDAPGATE_SERVER_ADDRESS") {
            config.ldap.server_address = addr;
        }
        if let Some(port) = var("LDAPGATE_SERVER_PORT") {
            let port = port.parse().map_err(|_| {
                crate::Error::InvalidConfig(format!("LDAPGATE_SERVER_PORT is not a port: {}", port))
            })?;
            config.ldap.server_port = Some(port);
        }
        if let Some(strategy) = var("LDAPGATE_TLS_STRATEGY") {
            config.ldap.tls_strategy = strategy.parse()?;
        }
        if let Some(templates) = var("LDAPGATE_BIND_DN_TEMPLATE") {
            config.ldap.bind_dn_template = BindDnTemplate::Many(
                templates.split(';').map(|t| t.trim().to_string()).collect(),
            );
        }
        if let Some(base) = var("LDAPGATE_USER_SEARCH_BASE") {
            config.ldap.user_search_base = Some(base);
        }
        if let Some(level) = var("LDAPGATE_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// One template or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindDnTemplate {
    One(String),
    Many(Vec<String>),
}

impl Default for BindDnTemplate {
    fn default() -> Self {
        BindDnTemplate::Many(Vec::new())
    }
}

impl BindDnTemplate {
    /// Flatten into a list, dropping blank entries
    pub fn into_templates(self) -> Vec<String> {
        let raw = match self {
            BindDnTemplate::One(t) => vec![t],
            BindDnTemplate::Many(ts) => ts,
        };

        if raw.iter().any(|t| t.is_empty()) {
            warn!("Ignoring blank 'bind_dn_template' entry");
        }

        raw.into_iter().filter(|t| !t.is_empty()).collect()
    }
}

/// LDAP authenticator options as they appear in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfigSection {
    /// Address of the LDAP server (hostname or IP)
    #[serde(default)]
    pub server_address: String,

    /// Port; defaults to 636 for `on_connect`, 389 otherwise
    #[serde(default)]
    pub server_port: Option<u16>,

    #[serde(default)]
    pub tls_strategy: TlsStrategy,

    /// Deprecated: `true` means `tls_strategy = "on_connect"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ssl: Option<bool>,

    /// Removed: has no effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_userdn: Option<bool>,

    /// Skip TLS certificate verification (not recommended for production)
    #[serde(default)]
    pub skip_tls_verify: bool,

    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout")]
    pub operation_timeout_secs: u64,

    /// Template(s) for the user DN, `{username}` is replaced with the
    /// RDN-escaped login name.
    /// Example: "uid={username},ou=people,dc=example,dc=org"
    #[serde(default)]
    pub bind_dn_template: BindDnTemplate,

    #[serde(default = "default_username_regex")]
    pub valid_username_regex: String,

    /// Look the user DN up with a directory search instead of templating
    #[serde(default)]
    pub lookup_dn: bool,

    #[serde(default)]
    pub user_search_base: Option<String>,

    /// Attribute holding the login name, e.g. uid or sAMAccountName
    #[serde(default)]
    pub user_attribute: Option<String>,

    /// Use {login_attr} and {login} placeholders
    #[serde(default = "default_lookup_filter")]
    pub lookup_dn_search_filter: String,

    /// Technical account DN for lookups; anonymous when unset
    #[serde(default)]
    pub lookup_dn_search_user: Option<String>,

    #[serde(default)]
    pub lookup_dn_search_password: Option<String>,

    /// Attribute whose value replaces the username in DN templates
    #[serde(default)]
    pub lookup_dn_user_dn_attribute: Option<String>,

    #[serde(default = "default_true")]
    pub use_lookup_dn_username: bool,

    /// Post-bind filter, use {username} and {userattr} placeholders
    #[serde(default)]
    pub search_filter: Option<String>,

    #[serde(default)]
    pub attributes: Vec<String>,

    #[serde(default)]
    pub allowed_groups: Vec<String>,

    /// Use {userdn} and {uid} placeholders
    #[serde(default = "default_group_filter")]
    pub group_search_filter: String,

    #[serde(default = "default_group_attributes")]
    pub group_attributes: Vec<String>,

    #[serde(default)]
    pub allowed_users: BTreeSet<String>,

    #[serde(default)]
    pub allow_all: bool,

    #[serde(default)]
    pub auth_state_attributes: Vec<String>,
}

fn default_timeout() -> u64 {
    crate::DEFAULT_TIMEOUT_SECS
}

fn default_username_regex() -> String {
    crate::DEFAULT_USERNAME_REGEX.to_string()
}

fn default_lookup_filter() -> String {
    "({login_attr}={login})".to_string()
}

fn default_group_filter() -> String {
    "(|(member={userdn})(uniqueMember={userdn})(memberUid={uid}))".to_string()
}

fn default_group_attributes() -> Vec<String> {
    vec![
        "member".to_string(),
        "uniqueMember".to_string(),
        "memberUid".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl Default for LdapConfigSection {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            server_port: None,
            tls_strategy: TlsStrategy::default(),
            use_ssl: None,
            escape_userdn: None,
            skip_tls_verify: false,
            connect_timeout_secs: default_timeout(),
            operation_timeout_secs: default_timeout(),
            bind_dn_template: BindDnTemplate::default(),
            valid_username_regex: default_username_regex(),
            lookup_dn: false,
            user_search_base: None,
            user_attribute: None,
            lookup_dn_search_filter: default_lookup_filter(),
            lookup_dn_search_user: None,
            lookup_dn_search_password: None,
            lookup_dn_user_dn_attribute: None,
            use_lookup_dn_username: true,
            search_filter: None,
            attributes: Vec::new(),
            allowed_groups: Vec::new(),
            group_search_filter: default_group_filter(),
            group_attributes: default_group_attributes(),
            allowed_users: BTreeSet::new(),
            allow_all: false,
            auth_state_attributes: Vec::new(),
        }
    }
}

impl LdapConfigSection {
    /// Validate and freeze into [`LdapSettings`]
    pub fn resolve(self) -> crate::Result<LdapSettings> {
        if self.server_address.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "server_address is required".into(),
            ));
        }

        let mut tls_strategy = self.tls_strategy;
        match self.use_ssl {
            Some(true) => {
                tls_strategy = TlsStrategy::OnConnect;
                warn!(
                    "use_ssl is deprecated in favor of tls_strategy, \
                     configure tls_strategy = \"on_connect\" instead of use_ssl = true"
                );
            }
            Some(false) => {
                warn!(
                    "use_ssl is deprecated in favor of tls_strategy, \
                     use_ssl = false has no effect and can be removed"
                );
            }
            None => {}
        }

        if self.escape_userdn.is_some() {
            warn!("escape_userdn was removed and no longer has any effect");
        }

        if self.connect_timeout_secs == 0 || self.operation_timeout_secs == 0 {
            return Err(crate::Error::InvalidConfig(
                "connect_timeout_secs and operation_timeout_secs must be at least 1".into(),
            ));
        }

        // Usernames must match from the first character
        let anchored = format!("^(?:{})", self.valid_username_regex);
        let valid_username_regex = Regex::new(&anchored).map_err(|e| {
            crate::Error::InvalidConfig(format!("Invalid valid_username_regex: {}", e))
        })?;

        let bind_dn_templates = self.bind_dn_template.into_templates();

        if !self.lookup_dn && bind_dn_templates.is_empty() {
            warn!("Logins will be rejected, configure lookup_dn or bind_dn_template");
        }

        if self.lookup_dn {
            let missing: Vec<&str> = [
                ("user_search_base", self.user_search_base.is_none()),
                ("user_attribute", self.user_attribute.is_none()),
                (
                    "lookup_dn_user_dn_attribute",
                    self.lookup_dn_user_dn_attribute.is_none(),
                ),
            ]
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                return Err(crate::Error::InvalidConfig(format!(
                    "lookup_dn requires {}",
                    missing.join(", ")
                )));
            }

            if self.lookup_dn_search_user.is_some() && self.lookup_dn_search_password.is_none() {
                return Err(crate::Error::InvalidConfig(
                    "lookup_dn_search_user requires lookup_dn_search_password".into(),
                ));
            }
        }

        if self.search_filter.is_some() && self.user_search_base.is_none() {
            return Err(crate::Error::InvalidConfig(
                "search_filter requires user_search_base".into(),
            ));
        }

        if !self.allowed_groups.is_empty()
            && (self.group_search_filter.is_empty() || self.group_attributes.is_empty())
        {
            warn!(
                "allowed_groups is set but group_search_filter or group_attributes is empty, \
                 every login will be rejected"
            );
        }

        Ok(LdapSettings {
            endpoint: DirectoryEndpoint::new(self.server_address, self.server_port, tls_strategy),
            skip_tls_verify: self.skip_tls_verify,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            bind_dn_templates,
            valid_username_regex,
            lookup_dn: self.lookup_dn,
            user_search_base: self.user_search_base,
            user_attribute: self.user_attribute,
            lookup_dn_search_filter: self.lookup_dn_search_filter,
            lookup_dn_search_user: self.lookup_dn_search_user,
            lookup_dn_search_password: self.lookup_dn_search_password,
            lookup_dn_user_dn_attribute: self.lookup_dn_user_dn_attribute,
            use_lookup_dn_username: self.use_lookup_dn_username,
            search_filter: self.search_filter,
            attributes: self.attributes,
            allowed_groups: self.allowed_groups,
            group_search_filter: self.group_search_filter,
            group_attributes: self.group_attributes,
            allowed_users: self.allowed_users,
            allow_all: self.allow_all,
            auth_state_attributes: self.auth_state_attributes,
        })
    }
}

/// Resolved, immutable authenticator settings
#[derive(Debug, Clone)]
pub struct LdapSettings {
    pub endpoint: DirectoryEndpoint,
    pub skip_tls_verify: bool,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub bind_dn_templates: Vec<String>,
    pub valid_username_regex: Regex,
    pub lookup_dn: bool,
    pub user_search_base: Option<String>,
    pub user_attribute: Option<String>,
    pub lookup_dn_search_filter: String,
    pub lookup_dn_search_user: Option<String>,
    pub lookup_dn_search_password: Option<String>,
    pub lookup_dn_user_dn_attribute: Option<String>,
    pub use_lookup_dn_username: bool,
    pub search_filter: Option<String>,
    pub attributes: Vec<String>,
    pub allowed_groups: Vec<String>,
    pub group_search_filter: String,
    pub group_attributes: Vec<String>,
    pub allowed_users: BTreeSet<String>,
    pub allow_all: bool,
    pub auth_state_attributes: Vec<String>,
}

impl LdapSettings {
    /// True when any local allow rule is configured
    pub fn has_allow_rules(&self) -> bool {
        self.allow_all || !self.allowed_users.is_empty() || !self.allowed_groups.is_empty()
    }

    /// Effective settings for display, secrets redacted
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "server_url": self.endpoint.url(),
            "tls_strategy": self.endpoint.tls_strategy,
            "skip_tls_verify": self.skip_tls_verify,
            "connect_timeout_secs": self.connect_timeout.as_secs(),
            "operation_timeout_secs": self.operation_timeout.as_secs(),
            "bind_dn_templates": self.bind_dn_templates,
            "valid_username_regex": self.valid_username_regex.as_str(),
            "lookup_dn": self.lookup_dn,
            "user_search_base": self.user_search_base,
            "user_attribute": self.user_attribute,
            "lookup_dn_search_filter": self.lookup_dn_search_filter,
            "lookup_dn_search_user": self.lookup_dn_search_user,
            "lookup_dn_search_password":
                self.lookup_dn_search_password.as_ref().map(|_| "********"),
            "lookup_dn_user_dn_attribute": self.lookup_dn_user_dn_attribute,
            "use_lookup_dn_username": self.use_lookup_dn_username,
            "search_filter": self.search_filter,
            "attributes": self.attributes,
            "allowed_groups": self.allowed_groups,
            "group_search_filter": self.group_search_filter,
            "group_attributes": self.group_attributes,
            "allowed_users": self.allowed_users,
            "allow_all": self.allow_all,
            "auth_state_attributes": self.auth_state_attributes,
        })
    }
}
