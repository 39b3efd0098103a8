//! LDAP authenticator
//!
//! Entry point used by the host framework. `authenticate` establishes an
//! identity, `check_allowed` decides whether that identity may log in.

use super::authorize::{self, AllowAuthenticated, HostPolicy};
use super::bind::{BindEngine, BoundSession};
use super::connection::{DirectoryConnector, DirectorySession, LdapConnector};
use super::filter::DirectoryFilter;
use super::resolver::IdentityResolver;
use super::types::Rejection;
use ldapgate_core::types::{AuthState, AuthenticatedUser};
use ldapgate_core::LdapSettings;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authenticates credentials against an LDAP directory.
///
/// Holds only read-only configuration, so one instance can be shared
/// across concurrent logins.
#[derive(Clone)]
pub struct LdapAuthenticator {
    settings: Arc<LdapSettings>,
    connector: Arc<dyn DirectoryConnector>,
    host: Arc<dyn HostPolicy>,
}

impl LdapAuthenticator {
    /// Authenticator talking to the configured LDAP server
    pub fn new(settings: LdapSettings) -> Self {
        let connector = Arc::new(LdapConnector::new(&settings));
        Self::with_connector(settings, connector)
    }

    pub fn with_connector(settings: LdapSettings, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            settings: Arc::new(settings),
            connector,
            host: Arc::new(AllowAuthenticated),
        }
    }

    pub fn with_host_policy(mut self, host: Arc<dyn HostPolicy>) -> Self {
        self.host = host;
        self
    }

    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }

    /// Verify credentials. `None` means rejected, the reason is only logged.
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<AuthenticatedUser> {
        match self.try_authenticate(username, password).await {
            Ok(user) => {
                info!("username:{} authenticated as {}", user.name, user.dn);
                Some(user)
            }
            Err(rejection) => {
                warn!(
                    "username:{} Login rejected ({}): {}",
                    username,
                    rejection.kind(),
                    rejection
                );
                None
            }
        }
    }

    /// Decide whether an authenticated user may log in. Uses only the auth
    /// state recorded by `authenticate`.
    pub fn check_allowed(&self, username: &str, auth_state: Option<&AuthState>) -> bool {
        authorize::decide(&self.settings, self.host.as_ref(), username, auth_state)
    }

    async fn try_authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedUser, Rejection> {
        self.validate_input(username, password)?;

        let connector = self.connector.as_ref();
        let resolution = IdentityResolver::new(&self.settings, connector)
            .resolve(username)
            .await?;

        let BoundSession { dn, mut session } = BindEngine::new(connector)
            .bind(&resolution.username, password, &resolution.candidates)
            .await
            .into_result()?;

        let inspected = self
            .inspect(session.as_mut(), &dn, &resolution.username)
            .await;
        session.close().await;
        let auth_state = inspected?;

        let name = if self.settings.use_lookup_dn_username {
            resolution.username
        } else {
            username.to_string()
        };

        debug!(
            "username:{} attributes:{:?}",
            name, auth_state.user_attributes
        );

        Ok(AuthenticatedUser {
            name,
            dn,
            auth_state,
        })
    }

    fn validate_input(&self, username: &str, password: &str) -> Result<(), Rejection> {
        if !self.settings.valid_username_regex.is_match(username) {
            warn!(
                "username:{} Illegal characters in username, must match regex {}",
                username,
                self.settings.valid_username_regex.as_str()
            );
            return Err(Rejection::InputRejected(
                "username does not match valid_username_regex".to_string(),
            ));
        }

        if password.trim().is_empty() {
            warn!("username:{} Login denied for blank password", username);
            return Err(Rejection::InputRejected("blank password".to_string()));
        }

        Ok(())
    }

    /// Post-bind checks on the user's own session
    async fn inspect(
        &self,
        session: &mut dyn DirectorySession,
        dn: &str,
        username: &str,
    ) -> Result<AuthState, Rejection> {
        let filter = DirectoryFilter::new(&self.settings);

        filter.check_search_filter(session, username).await?;
        let ldap_groups = filter.probe_groups(session, dn, username).await?;
        let user_attributes = filter.user_attributes(session, dn).await;

        Ok(AuthState {
            ldap_groups,
            user_attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::escape;
    use crate::ldap::mock::{entry, MockDirectory};
    use ldapgate_core::config::BindDnTemplate;
    use ldapgate_core::LdapConfigSection;

    const PEOPLE: &str = "ou=people,dc=planetexpress,dc=com";
    const SEARCH_USER: &str = "cn=admin,dc=planetexpress,dc=com";
    const ADMIN_STAFF: &str = "cn=admin_staff,ou=people,dc=planetexpress,dc=com";
    const SHIP_CREW: &str = "cn=ship_crew,ou=people,dc=planetexpress,dc=com";

    fn dn(cn: &str) -> String {
        format!("cn={},{}", cn, PEOPLE)
    }

    fn config() -> LdapConfigSection {
        LdapConfigSection {
            server_address: "ldap.example.com".to_string(),
            bind_dn_template: BindDnTemplate::One(format!("cn={{username}},{}", PEOPLE)),
            user_search_base: Some(PEOPLE.to_string()),
            user_attribute: Some("uid".to_string()),
            ..Default::default()
        }
    }

    fn authenticator(config: LdapConfigSection, mock: &MockDirectory) -> LdapAuthenticator {
        LdapAuthenticator::with_connector(config.resolve().unwrap(), mock.shared())
    }

    fn group_filter(user_dn: &str, uid: &str) -> String {
        format!(
            "(|(member={0})(uniqueMember={0})(memberUid={1}))",
            escape::filter_value(user_dn),
            escape::filter_value(uid)
        )
    }

    /// fry is on the ship crew, zoidberg is in no group
    fn planet_express() -> MockDirectory {
        MockDirectory::new()
            .account(&dn("fry"), "fry")
            .account(&dn("zoidberg"), "zoidberg")
            .account(&dn("professor"), "professor")
            .search_result(SHIP_CREW, &group_filter(&dn("fry"), "fry"), vec![entry(SHIP_CREW, &[])])
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_network_call() {
        let mock = planet_express();
        let auth = authenticator(config(), &mock);

        assert!(auth.authenticate("3fry/", "fry").await.is_none());
        assert!(auth.authenticate("Fry", "fry").await.is_none());
        assert!(auth.authenticate("fry)(uid=*", "fry").await.is_none());
        assert!(auth.authenticate("fry", "").await.is_none());
        assert!(auth.authenticate("fry", "   \t").await.is_none());

        assert_eq!(mock.connects(), 0);
    }

    #[tokio::test]
    async fn test_custom_regex_matches_from_start() {
        let mut config = config();
        config.valid_username_regex = "[a-z][a-z0-9]*".to_string();
        let mock = planet_express();
        let auth = authenticator(config, &mock);

        assert!(auth.authenticate("3fry", "pw").await.is_none());
        assert!(auth.authenticate("_fry", "pw").await.is_none());
        assert_eq!(mock.connects(), 0);

        assert!(auth.authenticate("fry", "fry").await.is_some());
    }

    #[tokio::test]
    async fn test_lookup_entry_without_dn_rejected() {
        let mut config = config();
        config.bind_dn_template = BindDnTemplate::default();
        config.lookup_dn = true;
        config.lookup_dn_user_dn_attribute = Some("cn".to_string());

        let mock = MockDirectory::new().search_result(
            PEOPLE,
            "(uid=bob)",
            vec![entry("", &[("cn", &["Bob"])])],
        );
        let auth = authenticator(config, &mock);

        assert!(auth.authenticate("bob", "anything").await.is_none());
        assert!(mock.binds().is_empty());
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test]
    async fn test_valid_login() {
        let mock = planet_express();
        let auth = authenticator(config(), &mock);

        let user = auth.authenticate("fry", "fry").await.unwrap();
        assert_eq!(user.name, "fry");
        assert_eq!(user.dn, dn("fry"));
        assert!(user.auth_state.ldap_groups.is_empty());
        assert!(auth.check_allowed(&user.name, Some(&user.auth_state)));
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let mock = planet_express();
        let auth = authenticator(config(), &mock);

        assert!(auth.authenticate("fry", "raw").await.is_none());
        assert!(auth.authenticate("flexo", "imposter").await.is_none());
        assert_eq!(mock.closes(), 0);
    }

    #[tokio::test]
    async fn test_second_template_binds() {
        let mut config = config();
        config.bind_dn_template = BindDnTemplate::Many(vec![
            "uid={username},ou=a".to_string(),
            "uid={username},ou=b".to_string(),
        ]);
        let mock = MockDirectory::new().account("uid=alice,ou=b", "secret");
        let auth = authenticator(config, &mock);

        let user = auth.authenticate("alice", "secret").await.unwrap();
        assert_eq!(user.dn, "uid=alice,ou=b");
        assert_eq!(mock.binds(), vec!["uid=alice,ou=a", "uid=alice,ou=b"]);
    }

    #[tokio::test]
    async fn test_lookup_dn_sole_candidate() {
        let mut config = config();
        config.bind_dn_template = BindDnTemplate::default();
        config.lookup_dn = true;
        config.lookup_dn_user_dn_attribute = Some("cn".to_string());
        config.lookup_dn_search_user = Some(SEARCH_USER.to_string());
        config.lookup_dn_search_password = Some("GoodNewsEveryone".to_string());

        let mock = MockDirectory::new()
            .account(SEARCH_USER, "GoodNewsEveryone")
            .account("cn=Bob Smith", "pw")
            .search_result(
                PEOPLE,
                "(uid=bob)",
                vec![entry("cn=Bob Smith", &[("cn", &["Bob Smith"])])],
            );
        let auth = authenticator(config, &mock);

        let user = auth.authenticate("bob", "pw").await.unwrap();
        assert_eq!(user.dn, "cn=Bob Smith");
        assert_eq!(user.name, "Bob Smith");
        assert_eq!(mock.binds(), vec![SEARCH_USER, "cn=Bob Smith"]);
    }

    #[tokio::test]
    async fn test_lookup_keeps_supplied_username() {
        let mut config = config();
        config.lookup_dn = true;
        config.lookup_dn_user_dn_attribute = Some("cn".to_string());
        config.use_lookup_dn_username = false;

        let fry_dn = format!("cn={},{}", escape::rdn_value("Philip J. Fry"), PEOPLE);
        let mock = MockDirectory::new()
            .account(&fry_dn, "fry")
            .search_result(
                PEOPLE,
                "(uid=fry)",
                vec![entry(&fry_dn, &[("cn", &["Philip J. Fry"])])],
            );
        let auth = authenticator(config.clone(), &mock);

        let user = auth.authenticate("fry", "fry").await.unwrap();
        assert_eq!(user.name, "fry");
        assert_eq!(user.dn, fry_dn);

        config.use_lookup_dn_username = true;
        let auth = authenticator(config, &mock);
        let user = auth.authenticate("fry", "fry").await.unwrap();
        assert_eq!(user.name, "Philip J. Fry");
    }

    #[tokio::test]
    async fn test_search_filter_rejects_unprovisioned() {
        let mut config = config();
        config.allow_all = true;
        config.search_filter = Some(
            "(&(objectClass=inetOrgPerson)(ou=Delivering Crew)(cn={username}))".to_string(),
        );

        let mock = planet_express().search_result(
            PEOPLE,
            "(&(objectClass=inetOrgPerson)(ou=Delivering Crew)(cn=fry))",
            vec![entry(&dn("fry"), &[])],
        );
        let auth = authenticator(config, &mock);

        assert!(auth.authenticate("fry", "fry").await.is_some());
        // zoidberg binds fine but is not matched by the filter
        assert!(auth.authenticate("zoidberg", "zoidberg").await.is_none());
        assert!(mock.binds().contains(&dn("zoidberg")));
        assert_eq!(mock.closes(), mock.connects());
    }

    #[tokio::test]
    async fn test_second_group_allows() {
        let mut config = config();
        config.allowed_groups = vec![ADMIN_STAFF.to_string(), SHIP_CREW.to_string()];
        let mock = planet_express();
        let auth = authenticator(config, &mock);

        let user = auth.authenticate("fry", "fry").await.unwrap();
        assert_eq!(user.auth_state.ldap_groups, vec![SHIP_CREW.to_string()]);
        assert!(auth.check_allowed(&user.name, Some(&user.auth_state)));

        let user = auth.authenticate("zoidberg", "zoidberg").await.unwrap();
        assert!(user.auth_state.ldap_groups.is_empty());
        assert!(!auth.check_allowed(&user.name, Some(&user.auth_state)));
    }

    #[tokio::test]
    async fn test_allow_config_sources() {
        let mut config = config();
        config.allowed_groups = vec![SHIP_CREW.to_string()];
        config.allowed_users = ["zoidberg".to_string()].into_iter().collect();
        let mock = planet_express();
        let auth = authenticator(config.clone(), &mock);

        for (name, allowed) in [("fry", true), ("zoidberg", true), ("professor", false)] {
            let user = auth.authenticate(name, name).await.unwrap();
            assert_eq!(
                auth.check_allowed(&user.name, Some(&user.auth_state)),
                allowed,
                "{}",
                name
            );
        }

        config.allow_all = true;
        let auth = authenticator(config, &mock);
        let user = auth.authenticate("professor", "professor").await.unwrap();
        assert!(auth.check_allowed(&user.name, Some(&user.auth_state)));
    }

    #[tokio::test]
    async fn test_missing_group_filter_fails_closed() {
        let mut config = config();
        config.allowed_groups = vec![SHIP_CREW.to_string()];
        config.group_search_filter = String::new();
        let mock = planet_express();
        let auth = authenticator(config, &mock);

        assert!(auth.authenticate("fry", "fry").await.is_none());
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test]
    async fn test_auth_state_attributes() {
        let mut config = config();
        config.auth_state_attributes = vec!["employeeType".to_string()];
        let mock = planet_express().search_result(
            &dn("fry"),
            "(objectClass=*)",
            vec![entry(&dn("fry"), &[("employeeType", &["Delivery boy"])])],
        );
        let auth = authenticator(config, &mock);

        let user = auth.authenticate("fry", "fry").await.unwrap();
        assert_eq!(
            user.auth_state.user_attributes.get("employeeType"),
            Some(&vec!["Delivery boy".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unreachable_directory_rejects() {
        let mock = MockDirectory::new().unreachable();
        let auth = authenticator(config(), &mock);

        assert!(auth.authenticate("fry", "fry").await.is_none());
        assert_eq!(mock.connects(), 1);
    }

    #[tokio::test]
    async fn test_check_allowed_is_pure() {
        let mut config = config();
        config.allowed_groups = vec![SHIP_CREW.to_string()];
        let mock = planet_express();
        let auth = authenticator(config, &mock);

        let user = auth.authenticate("fry", "fry").await.unwrap();
        let connects = mock.connects();

        let verdicts: Vec<bool> = (0..5)
            .map(|_| auth.check_allowed(&user.name, Some(&user.auth_state)))
            .collect();

        assert!(verdicts.iter().all(|v| *v));
        assert_eq!(mock.connects(), connects);
    }

    #[tokio::test]
    async fn test_concurrent_logins() {
        let mock = planet_express();
        let auth = Arc::new(authenticator(config(), &mock));

        let handles: Vec<_> = ["fry", "zoidberg", "professor", "fry"]
            .into_iter()
            .map(|name| {
                let auth = Arc::clone(&auth);
                tokio::spawn(async move { auth.authenticate(name, name).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(mock.closes(), 4);
    }

    #[test]
    fn test_authenticator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LdapAuthenticator>();
    }
}
