//! Explicit per-request access context
//!
//! The security query builder consumes this value directly; nothing in the
//! engine depends on thread identity or ambient state.

use serde::{Deserialize, Serialize};

/// Access token granted to every unauthenticated request.
pub const PUBLIC_ACCESS_TAG: &str = "PUBLIC";

/// Who is asking, and what they may see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Login name; `None` for anonymous requests.
    pub login: Option<String>,
    /// Access tokens the user is allowed to see.
    pub allow: Vec<String>,
    /// Access tokens explicitly denied, subtracted after allow.
    pub deny: Vec<String>,
    /// Super users bypass the security clause entirely.
    pub super_user: bool,
}

impl UserContext {
    /// Anonymous context: sees `PUBLIC` submissions only.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated context with the given allow list.
    #[must_use]
    pub fn with_allow(login: impl Into<String>, allow: Vec<String>) -> Self {
        Self {
            login: Some(login.into()),
            allow,
            deny: Vec::new(),
            super_user: false,
        }
    }

    /// Super-user context.
    #[must_use]
    pub fn super_user(login: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            allow: Vec::new(),
            deny: Vec::new(),
            super_user: true,
        }
    }

    /// Effective allow tokens: the user's own, or `PUBLIC` when none exist.
    #[must_use]
    pub fn effective_allow(&self) -> Vec<&str> {
        if self.allow.is_empty() {
            vec![PUBLIC_ACCESS_TAG]
        } else {
            self.allow.iter().map(String::as_str).collect()
        }
    }
}
