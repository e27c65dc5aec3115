//! Per-user state that survives restarts, kept in a single JSON file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use jamal_core::{DriverId, RideId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SyncError;

const DEFAULT_VOLUME: f32 = 0.5;

/// The client's outstanding request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub id: RideId,
    pub timestamp: DateTime<Utc>,
}

/// The ride a driver is currently serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedRide {
    pub ride_id: RideId,
    pub driver_id: DriverId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    /// 0.0 ..= 1.0
    pub volume: f32,
    pub sounds: bool,
    pub vibration: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            sounds: true,
            vibration: true,
        }
    }
}

impl NotificationPreferences {
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub client_request: Option<ClientRequest>,
    pub driver_code: Option<String>,
    pub accepted_ride: Option<AcceptedRide>,
    /// Requests this driver declined; hidden from its queue.
    pub refused_rides: BTreeSet<RideId>,
    pub admin_authenticated_at: Option<DateTime<Utc>>,
    pub preferences: NotificationPreferences,
}

/// JSON file holding a [`Session`].
///
/// A missing or unreadable file loads as an empty session. Saves write a
/// sibling temp file and rename it over the target.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.jamal-express/session.json`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".jamal-express").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Session {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Session::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read session file");
                return Session::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "corrupt session file, starting fresh"
                );
                Session::default()
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Load, mutate, save. Returns the saved session.
    pub fn update(&self, f: impl FnOnce(&mut Session)) -> Result<Session, SyncError> {
        let mut session = self.load();
        f(&mut session);
        self.save(&session)?;
        Ok(session)
    }

    pub fn clear(&self) -> Result<(), SyncError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
