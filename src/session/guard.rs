use std::sync::Arc;
use tracing::warn;

use super::provider::{SessionProvider, SessionState};
use crate::auth::{is_valid_role_path, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardReason {
    NotAuthenticated,
    RoleMismatch,
    Inactive,
}

/// Outcome of checking a page against the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session check still running, render nothing yet
    Loading,
    Authorized,
    /// Clear credentials and return to the landing page
    Logout(GuardReason),
    /// Send the user to another page of their own area
    Redirect(String),
}

/// Page guard for one role area
pub struct SessionGuard {
    provider: Arc<SessionProvider>,
    allowed_paths: Option<Vec<String>>,
}

impl SessionGuard {
    pub fn new(provider: Arc<SessionProvider>) -> Self {
        Self {
            provider,
            allowed_paths: None,
        }
    }

    /// Restrict the guarded area to paths under these prefixes
    pub fn with_allowed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    pub fn check(&self, required: Role, path: &str) -> GuardDecision {
        let user = match self.provider.state() {
            SessionState::Loading => return GuardDecision::Loading,
            SessionState::Anonymous => return GuardDecision::Logout(GuardReason::NotAuthenticated),
            SessionState::Authenticated(user) => user,
        };

        if user.role != required {
            warn!(
                "Security Alert: {} session attempted to open {} page {}",
                user.role, required, path
            );
            return GuardDecision::Logout(GuardReason::RoleMismatch);
        }

        if !user.is_active {
            warn!("Inactive account {} attempted to open {}", user.username, path);
            return GuardDecision::Logout(GuardReason::Inactive);
        }

        if !is_valid_role_path(required, path) {
            return GuardDecision::Redirect(required.dashboard_path().to_string());
        }

        if let Some(allowed) = &self.allowed_paths {
            if !allowed.iter().any(|prefix| path.starts_with(prefix.as_str())) {
                return GuardDecision::Redirect(required.dashboard_path().to_string());
            }
        }

        GuardDecision::Authorized
    }

    /// `check`, then sign out when the decision demands it
    pub async fn enforce(&self, required: Role, path: &str) -> GuardDecision {
        let decision = self.check(required, path);
        if matches!(decision, GuardDecision::Logout(_)) {
            self.provider.logout().await;
        }
        decision
    }
}
