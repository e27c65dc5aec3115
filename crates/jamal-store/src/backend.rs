use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jamal_core::destination::DestinationId;
use jamal_core::payment::PaymentId;
use jamal_core::{
    Destination, DestinationPatch, Driver, DriverId, DriverPatch, DriverStatus, NewDestination,
    NewDriver, NewPayment, NewRideRequest, Notification, Payment, PaymentPatch, Rating, RideId,
    RidePatch, RideRequest, RideStatus,
};

use crate::StoreError;

pub type SharedBackend = Arc<dyn Backend>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Row filter for `drivers`. Results are always ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverFilter {
    pub active: Option<bool>,
    pub status: Option<DriverStatus>,
}

impl DriverFilter {
    pub fn active() -> Self {
        Self {
            active: Some(true),
            status: None,
        }
    }

    /// Active drivers currently accepting rides.
    pub fn available() -> Self {
        Self {
            active: Some(true),
            status: Some(DriverStatus::Online),
        }
    }

    pub fn matches(&self, driver: &Driver) -> bool {
        self.active.is_none_or(|a| driver.active == a)
            && self.status.is_none_or(|s| driver.status == s)
    }
}

/// Row filter for `solicitacoes`. Results are ordered by `timestamp`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideFilter {
    pub status: Option<RideStatus>,
    /// Matches the `id` inside the driver snapshot.
    pub driver_id: Option<DriverId>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub until: Option<DateTime<Utc>>,
    pub order: SortOrder,
}

impl RideFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(RideStatus::Pending),
            ..Self::default()
        }
    }

    pub fn matches(&self, ride: &RideRequest) -> bool {
        self.status.is_none_or(|s| ride.status == s)
            && self.driver_id.is_none_or(|id| ride.driver_id() == Some(id))
            && self.since.is_none_or(|t| ride.timestamp >= t)
            && self.until.is_none_or(|t| ride.timestamp <= t)
    }
}

/// Table-level access to the ride-hailing data.
///
/// One method per operation the services need; implementations are the
/// in-process [`MemoryStore`](crate::MemoryStore), the DuckDB file store and
/// the hosted REST backend. Missing rows surface as
/// [`StoreError::NotFound`], never as an empty success.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Cheap round trip proving the backend is reachable and the schema exists.
    async fn ping(&self) -> Result<(), StoreError>;

    // ── Drivers ──

    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, StoreError>;
    async fn get_driver(&self, id: DriverId) -> Result<Driver, StoreError>;
    async fn find_driver_by_code(&self, code: &str) -> Result<Option<Driver>, StoreError>;
    /// Fails with [`StoreError::DuplicateCode`] when the code is taken.
    async fn insert_driver(&self, driver: NewDriver) -> Result<Driver, StoreError>;
    async fn update_driver(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, StoreError>;
    async fn delete_driver(&self, id: DriverId) -> Result<(), StoreError>;

    // ── Ride requests ──

    async fn insert_ride(&self, ride: NewRideRequest) -> Result<RideRequest, StoreError>;
    async fn get_ride(&self, id: RideId) -> Result<RideRequest, StoreError>;
    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<RideRequest>, StoreError>;
    async fn update_ride(&self, id: RideId, patch: &RidePatch) -> Result<RideRequest, StoreError>;
    /// Apply `patch` only while the row is still in `expected`; otherwise
    /// [`StoreError::Conflict`] and the row is untouched.
    async fn update_ride_if(
        &self,
        id: RideId,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<RideRequest, StoreError>;
    async fn delete_ride(&self, id: RideId) -> Result<(), StoreError>;

    // ── Destinations ──

    /// Ordered by name.
    async fn list_destinations(&self, active_only: bool) -> Result<Vec<Destination>, StoreError>;
    async fn get_destination(&self, id: DestinationId) -> Result<Destination, StoreError>;
    async fn insert_destination(&self, destination: NewDestination)
    -> Result<Destination, StoreError>;
    async fn update_destination(
        &self,
        id: DestinationId,
        patch: &DestinationPatch,
    ) -> Result<Destination, StoreError>;
    async fn delete_destination(&self, id: DestinationId) -> Result<(), StoreError>;

    // ── Payments ──

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError>;
    /// Newest period first.
    async fn list_payments(&self, driver_id: Option<DriverId>) -> Result<Vec<Payment>, StoreError>;
    async fn update_payment(&self, id: PaymentId, patch: &PaymentPatch)
    -> Result<Payment, StoreError>;

    // ── Notifications and ratings ──

    async fn insert_notification(&self, notification: Notification)
    -> Result<Notification, StoreError>;
    /// Newest first.
    async fn list_notifications(&self) -> Result<Vec<Notification>, StoreError>;
    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError>;
    async fn insert_rating(&self, rating: Rating) -> Result<(), StoreError>;
}
