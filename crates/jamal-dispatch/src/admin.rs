//! Admin password gate, remembered in the session file for a day.

use chrono::{DateTime, TimeDelta, Utc};
use jamal_sync::SessionStore;
use tracing::{info, warn};

use crate::DispatchError;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// How long a successful login stays valid.
pub const SESSION_TTL: TimeDelta = TimeDelta::hours(24);

pub struct AdminAuth {
    password: String,
    session: SessionStore,
}

impl AdminAuth {
    pub fn new(password: impl Into<String>, session: SessionStore) -> Self {
        Self {
            password: password.into(),
            session,
        }
    }

    pub fn login(&self, password: &str) -> Result<(), DispatchError> {
        self.login_at(password, Utc::now())
    }

    pub fn login_at(&self, password: &str, now: DateTime<Utc>) -> Result<(), DispatchError> {
        if password != self.password {
            warn!("admin login rejected");
            return Err(DispatchError::InvalidPassword);
        }
        self.session
            .update(|s| s.admin_authenticated_at = Some(now))?;
        info!("admin logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), DispatchError> {
        self.session.update(|s| s.admin_authenticated_at = None)?;
        info!("admin logged out");
        Ok(())
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.session
            .load()
            .admin_authenticated_at
            .is_some_and(|at| at <= now && now - at < SESSION_TTL)
    }

    /// Gate for admin commands.
    pub fn require(&self) -> Result<(), DispatchError> {
        if self.is_authenticated(Utc::now()) {
            Ok(())
        } else {
            Err(DispatchError::NotAuthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(dir: &tempfile::TempDir) -> AdminAuth {
        let store = SessionStore::new(dir.path().join("session.json"));
        AdminAuth::new(DEFAULT_ADMIN_PASSWORD, store)
    }

    #[test]
    fn wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let admin = auth(&dir);
        assert!(matches!(
            admin.login("admin"),
            Err(DispatchError::InvalidPassword)
        ));
        assert!(matches!(admin.require(), Err(DispatchError::NotAuthenticated)));
    }

    #[test]
    fn login_lasts_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let admin = auth(&dir);
        let t0: DateTime<Utc> = "2026-05-01T08:00:00Z".parse().unwrap();
        admin.login_at("admin123", t0).unwrap();

        assert!(admin.is_authenticated(t0 + TimeDelta::hours(23)));
        assert!(!admin.is_authenticated(t0 + TimeDelta::hours(24)));

        // A second handle on the same file sees the login.
        assert!(auth(&dir).is_authenticated(t0 + TimeDelta::minutes(1)));

        admin.logout().unwrap();
        assert!(!admin.is_authenticated(t0 + TimeDelta::minutes(1)));
    }
}
