//! Site state and actions

use chrono::{DateTime, Utc};
use gophr_core::{LifecycleEvent, Resource};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Signed-in account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token returned by `login` or `register`
    pub token: String,
    /// Account name, when the API returned one
    pub user: Option<String>,
}

/// Forms that are validated before their call is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// Account creation
    Register,
    /// Sign-in
    Login,
    /// Password change
    Password,
    /// Email change
    Email,
    /// Profile edit
    Profile,
}

/// Everything the site renders from
#[derive(Debug, Clone, Default)]
pub struct SiteState {
    /// Packages loaded so far, by name
    pub packages: HashMap<String, Value>,
    /// Latest search results
    pub search_results: Vec<Value>,
    /// Current session
    pub session: Option<Session>,
    /// Latest profile fetched or saved
    pub profile: Option<Value>,
    /// API tokens of the signed-in account
    pub tokens: Vec<Value>,
    /// Package subscriptions of the signed-in account
    pub subscriptions: Vec<Value>,
    /// Forms that passed validation and have not been submitted yet
    pub validated_forms: HashSet<Form>,
    /// Calls between their request and terminal events
    pub pending: usize,
    /// Last failure per resource, cleared by the next success
    pub last_error: HashMap<Resource, String>,
    /// Time of the last successful call
    pub last_updated: Option<DateTime<Utc>>,
}

impl SiteState {
    /// Whether `name` is already loaded
    #[must_use]
    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Whether a call is outstanding
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.pending > 0
    }
}

/// Actions the site reducer handles
#[derive(Debug, Clone)]
pub enum SiteAction {
    /// Request/success/failure event from the dispatch pipeline
    Lifecycle(LifecycleEvent),
    /// Drop the session and everything scoped to it
    Logout,
    /// A form passed client-side validation
    ValidateForm(Form),
}

impl From<LifecycleEvent> for SiteAction {
    fn from(event: LifecycleEvent) -> Self {
        Self::Lifecycle(event)
    }
}
