//! Service layer: ride lifecycle, fleet, destinations, finance, notifications and reporting.
//!
//! Every service holds a [`SharedBackend`] and works the same against the
//! hosted REST backend, DuckDB or memory.

pub mod admin;
pub mod dashboard;
pub mod destinations;
pub mod drivers;
mod error;
pub mod finance;
pub mod notifications;
pub mod rides;

pub use admin::AdminAuth;
pub use dashboard::{Dashboard, DashboardReport, Period};
pub use destinations::DestinationService;
pub use drivers::DriverService;
pub use error::DispatchError;
pub use finance::{FinanceService, Month, export_csv};
pub use notifications::{Alert, AlertKind, NotificationService, Notifier, TerminalNotifier};
pub use rides::{RideForm, RideService, RideStatusView};

use jamal_core::FareSchedule;
use jamal_store::SharedBackend;
use jamal_sync::EventBus;

/// All services wired to one backend and one event bus.
#[derive(Clone)]
pub struct Services {
    pub rides: RideService,
    pub drivers: DriverService,
    pub destinations: DestinationService,
    pub finance: FinanceService,
    pub notifications: NotificationService,
    pub dashboard: Dashboard,
    pub events: EventBus,
}

impl Services {
    pub fn new(backend: SharedBackend, fares: FareSchedule) -> Self {
        let events = EventBus::default();
        Self {
            rides: RideService::new(backend.clone(), events.clone(), fares),
            drivers: DriverService::new(backend.clone(), events.clone()),
            destinations: DestinationService::new(backend.clone()),
            finance: FinanceService::new(backend.clone(), fares),
            notifications: NotificationService::new(backend.clone()),
            dashboard: Dashboard::new(backend, fares),
            events,
        }
    }
}
