//! Authenticated viewer identity.

use crate::config::Settings;

/// The viewer's identity and credential. Exactly one session is live per
/// process; every component reads it, only the login flow builds it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub is_admin: bool,
    token: Option<String>,
}

impl Session {
    /// Build a session from loaded settings.
    pub fn from_settings(cfg: &Settings) -> Self {
        Self {
            user_id: cfg.user_id.clone(),
            username: cfg.username.clone(),
            avatar: cfg.avatar.clone(),
            is_admin: cfg.is_admin,
            token: cfg.token.clone(),
        }
    }

    /// Opaque bearer credential, when one is configured.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
