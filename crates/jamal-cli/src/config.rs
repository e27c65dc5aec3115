//! Global flags and environment, and the backend they select.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use jamal_core::FareSchedule;
use jamal_dispatch::admin::DEFAULT_ADMIN_PASSWORD;
use jamal_dispatch::{AdminAuth, Services};
use jamal_store::{DuckStore, MemoryStore, SharedBackend};
use jamal_sync::{PollIntervals, SessionStore, SupabaseClient};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Hosted backend base URL. Takes precedence over the local database.
    #[arg(long, env = "SUPABASE_URL", global = true)]
    pub supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", global = true, hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Session file [default: ~/.jamal-express/session.json]
    #[arg(long, env = "JAMAL_SESSION", global = true)]
    pub session: Option<PathBuf>,

    /// DuckDB file used when no hosted backend is configured.
    #[arg(long, env = "JAMAL_LOCAL_DB", global = true)]
    pub local_db: Option<PathBuf>,

    #[arg(
        long,
        env = "JAMAL_ADMIN_PASSWORD",
        global = true,
        hide_env_values = true,
        default_value = DEFAULT_ADMIN_PASSWORD
    )]
    pub admin_password: String,

    /// Platform share of each fare, 0.0 to 1.0.
    #[arg(long, env = "JAMAL_COMMISSION_RATE", global = true, default_value_t = 0.15)]
    pub commission_rate: f64,

    /// Seconds between ride status checks.
    #[arg(long, global = true, default_value_t = 3)]
    pub status_interval: u64,

    /// Seconds between pending queue checks.
    #[arg(long, global = true, default_value_t = 5)]
    pub queue_interval: u64,

    /// Seconds between online driver counts.
    #[arg(long, global = true, default_value_t = 30)]
    pub online_interval: u64,

    /// Seconds between driver position updates.
    #[arg(long, global = true, default_value_t = 60)]
    pub location_interval: u64,
}

/// Everything a command needs.
pub struct App {
    pub services: Services,
    pub session: SessionStore,
    pub admin: AdminAuth,
    pub intervals: PollIntervals,
    pub backend: SharedBackend,
}

impl Config {
    pub fn fares(&self) -> anyhow::Result<FareSchedule> {
        FareSchedule::default()
            .with_commission_rate(self.commission_rate)
            .context("invalid JAMAL_COMMISSION_RATE")
    }

    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            ride_status: Duration::from_secs(self.status_interval.max(1)),
            driver_queue: Duration::from_secs(self.queue_interval.max(1)),
            online_count: Duration::from_secs(self.online_interval.max(1)),
            driver_location: Duration::from_secs(self.location_interval.max(1)),
        }
    }

    pub fn session_store(&self) -> anyhow::Result<SessionStore> {
        let path = self
            .session
            .clone()
            .or_else(SessionStore::default_path)
            .context("cannot locate the home directory; set JAMAL_SESSION")?;
        Ok(SessionStore::new(path))
    }

    /// Hosted backend when a URL is set, else the local DuckDB file, else memory.
    pub fn backend(&self) -> anyhow::Result<SharedBackend> {
        if let Some(url) = &self.supabase_url {
            let key = self
                .supabase_key
                .as_deref()
                .context("SUPABASE_ANON_KEY is required with SUPABASE_URL")?;
            info!(url = %url, "using hosted backend");
            return Ok(Arc::new(SupabaseClient::new(url.as_str(), key)));
        }
        if let Some(path) = &self.local_db {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
            let store = DuckStore::open_persistent(path)
                .with_context(|| format!("opening {}", path.display()))?;
            return Ok(Arc::new(store));
        }
        warn!("no backend configured; data lives in memory for this run only");
        Ok(Arc::new(MemoryStore::new()))
    }

    pub fn is_ephemeral(&self) -> bool {
        self.supabase_url.is_none() && self.local_db.is_none()
    }

    pub async fn app(&self) -> anyhow::Result<App> {
        let backend = self.backend()?;
        let services = Services::new(backend.clone(), self.fares()?);
        if self.is_ephemeral() {
            services
                .drivers
                .seed_defaults()
                .await
                .context("seeding in-memory fleet")?;
        }
        let session = self.session_store()?;
        let admin = AdminAuth::new(self.admin_password.clone(), session.clone());
        Ok(App {
            services,
            session,
            admin,
            intervals: self.intervals(),
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        config: Config,
    }

    #[test]
    fn defaults_pick_memory_and_standard_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session.json");
        let h = Harness::try_parse_from(["jamal", "--session", session.to_str().unwrap()])
            .unwrap();
        let mut config = h.config;
        config.supabase_url = None;
        config.local_db = None;
        assert!(config.is_ephemeral());
        assert_eq!(config.intervals(), PollIntervals::default());
        assert_eq!(config.fares().unwrap().commission_rate, 0.15);
    }

    #[tokio::test]
    async fn ephemeral_app_seeds_fleet_and_writes_session_where_told() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("nested").join("session.json");
        let h = Harness::try_parse_from(["jamal", "--session", session.to_str().unwrap()])
            .unwrap();
        let mut config = h.config;
        config.supabase_url = None;
        config.local_db = None;

        let app = config.app().await.unwrap();
        assert_eq!(app.services.drivers.online_count().await.unwrap(), 2);
        app.session
            .update(|s| s.driver_code = Some("1234".into()))
            .unwrap();
        assert!(session.exists());
        assert_eq!(app.session.load().driver_code.as_deref(), Some("1234"));
    }

    #[test]
    fn hosted_backend_needs_key() {
        let h = Harness::try_parse_from(["jamal", "--supabase-url", "https://x.supabase.co"])
            .unwrap();
        let mut config = h.config;
        config.supabase_key = None;
        assert!(config.backend().is_err());
    }

    #[test]
    fn commission_out_of_range_is_rejected() {
        let h = Harness::try_parse_from(["jamal", "--commission-rate", "1.5"]).unwrap();
        assert!(h.config.fares().is_err());
    }
}
