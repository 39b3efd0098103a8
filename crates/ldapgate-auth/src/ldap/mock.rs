//! In-memory directory for tests
//!
//! Accounts are DN/password pairs. Searches are answered from an exact
//! `(base, filter)` table, anything else returns no entries.

use super::connection::{ConnectError, DirectoryConnector, DirectoryError, DirectorySession};
use async_trait::async_trait;
use ldap3::{Scope, SearchEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, String>,
    searches: HashMap<(String, String), Vec<SearchEntry>>,
    failing_searches: Vec<String>,
    unreachable: bool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    binds: Mutex<Vec<String>>,
    searched: Mutex<Vec<(String, String)>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockDirectory {
    state: Arc<MockState>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> &mut MockState {
        Arc::get_mut(&mut self.state).expect("mock is configured before it is shared")
    }

    pub fn account(mut self, dn: &str, password: &str) -> Self {
        self.state_mut()
            .accounts
            .insert(dn.to_string(), password.to_string());
        self
    }

    pub fn search_result(mut self, base: &str, filter: &str, entries: Vec<SearchEntry>) -> Self {
        self.state_mut()
            .searches
            .insert((base.to_string(), filter.to_string()), entries);
        self
    }

    pub fn failing_search(mut self, base: &str) -> Self {
        self.state_mut().failing_searches.push(base.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.state_mut().unreachable = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// DNs bind was attempted with, in order
    pub fn binds(&self) -> Vec<String> {
        self.state.binds.lock().unwrap().clone()
    }

    /// `(base, filter)` of every search, in order
    pub fn searched(&self) -> Vec<(String, String)> {
        self.state.searched.lock().unwrap().clone()
    }

    pub fn shared(&self) -> Arc<dyn DirectoryConnector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(
        &self,
        dn: &str,
        password: &str,
    ) -> Result<Box<dyn DirectorySession>, ConnectError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        if self.state.unreachable {
            return Err(ConnectError::Transport("connection refused".to_string()));
        }

        if !dn.is_empty() {
            self.state.binds.lock().unwrap().push(dn.to_string());
            if self.state.accounts.get(dn).map(String::as_str) != Some(password) {
                return Err(ConnectError::Bind {
                    rc: 49,
                    message: "invalidCredentials".to_string(),
                });
            }
        }

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    state: Arc<MockState>,
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn search(
        &mut self,
        base: &str,
        _scope: Scope,
        filter: &str,
        _attrs: &[String],
    ) -> Result<Vec<SearchEntry>, DirectoryError> {
        self.state
            .searched
            .lock()
            .unwrap()
            .push((base.to_string(), filter.to_string()));

        if self.state.failing_searches.iter().any(|b| b == base) {
            return Err(DirectoryError(format!("operations error under {}", base)));
        }

        Ok(self
            .state
            .searches
            .get(&(base.to_string(), filter.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Build a search entry from attribute name/value pairs
pub(crate) fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> SearchEntry {
    SearchEntry {
        dn: dn.to_string(),
        attrs: attrs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect(),
        bin_attrs: HashMap::new(),
    }
}
