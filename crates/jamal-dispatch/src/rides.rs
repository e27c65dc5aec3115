//! Ride request lifecycle: request, accept or refuse, arrive, finish, rate.

use std::collections::HashSet;

use chrono::Utc;
use jamal_core::destination::DestinationId;
use jamal_core::format::pickup_address;
use jamal_core::geo::{
    AVERAGE_SPEED_KMH, MIN_ARRIVAL_MINUTES, calculate_distance, estimate_arrival_minutes,
    geocode_address,
};
use jamal_core::matching::{nearest_driver, rank_requests_by_proximity};
use jamal_core::notification::updated_average;
use jamal_core::{
    ClientInfo, CoreError, Coordinates, Driver, DriverId, DriverPatch, DriverSnapshot,
    FareSchedule, NewRideRequest, RankedRequest, Rating, RideId, RidePatch, RideRequest,
    RideStatus,
};
use jamal_store::{DriverFilter, RideFilter, SharedBackend, StoreError};
use jamal_sync::{EventBus, RideEvent};
use tracing::{info, warn};

use crate::DispatchError;

/// What a client fills in to ask for a ride.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideForm {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub number: String,
    pub cep: Option<String>,
    pub destination_id: Option<DestinationId>,
    /// Device position, when the client shared it.
    pub coordinates: Option<Coordinates>,
}

impl RideForm {
    pub fn validate(&self) -> Result<DestinationId, CoreError> {
        let required = [
            ("nome", &self.name),
            ("telefone", &self.phone),
            ("rua", &self.street),
            ("numero", &self.number),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::MissingField(field));
            }
        }
        self.destination_id.ok_or(CoreError::MissingField("destino"))
    }
}

/// What the client polls for.
#[derive(Debug, Clone, PartialEq)]
pub struct RideStatusView {
    pub id: RideId,
    pub status: RideStatus,
    pub driver: DriverSnapshot,
    pub destination: Option<String>,
}

impl From<RideRequest> for RideStatusView {
    fn from(ride: RideRequest) -> Self {
        Self {
            id: ride.id,
            status: ride.status,
            driver: ride.driver,
            destination: ride.destination,
        }
    }
}

/// Minutes to cover `km` at the average urban speed, unclamped.
pub(crate) fn trip_minutes(km: f64) -> f64 {
    (km * 60.0 / AVERAGE_SPEED_KMH).ceil()
}

/// Seconds from the request to `now`, never negative.
pub fn response_seconds(ride: &RideRequest, now: chrono::DateTime<Utc>) -> i64 {
    (now - ride.timestamp).num_seconds().max(0)
}

#[derive(Clone)]
pub struct RideService {
    backend: SharedBackend,
    events: EventBus,
    fares: FareSchedule,
}

impl RideService {
    pub fn new(backend: SharedBackend, events: EventBus, fares: FareSchedule) -> Self {
        Self {
            backend,
            events,
            fares,
        }
    }

    /// Validate the form, check a driver is online, insert a pending request.
    pub async fn request_ride(&self, form: RideForm) -> Result<RideRequest, DispatchError> {
        let destination_id = form.validate()?;
        let destination = self.backend.get_destination(destination_id).await?;
        if !destination.active {
            return Err(DispatchError::DestinationUnavailable(destination_id));
        }
        let online = self.backend.list_drivers(&DriverFilter::available()).await?;
        if online.is_empty() {
            return Err(DispatchError::NoDriversOnline);
        }

        let address = pickup_address(&form.street, &form.number, form.cep.as_deref());
        let coordinates = form.coordinates.or_else(|| geocode_address(&address));
        let client = ClientInfo {
            name: form.name.trim().to_string(),
            phone: form.phone.trim().to_string(),
            address,
            coordinates,
        };
        let nearest = coordinates.and_then(|c| nearest_driver(c, &online));
        let ride = self
            .backend
            .insert_ride(NewRideRequest::pending(client, destination.name))
            .await?;
        info!(
            ride_id = ride.id,
            online = online.len(),
            nearest_driver_id = ?nearest.map(|(d, _)| d.id),
            nearest_km = ?nearest.map(|(_, km)| km),
            "ride requested"
        );
        self.events.publish(RideEvent::NewRequest { ride_id: ride.id });
        Ok(ride)
    }

    /// Closest online driver to `pickup` that has shared a position.
    pub async fn nearest_online_driver(
        &self,
        pickup: Coordinates,
    ) -> Result<Option<(Driver, f64)>, DispatchError> {
        let online = self.backend.list_drivers(&DriverFilter::available()).await?;
        Ok(nearest_driver(pickup, &online).map(|(d, km)| (d.clone(), km)))
    }

    pub async fn ride_status(&self, id: RideId) -> Result<RideStatusView, DispatchError> {
        Ok(self.backend.get_ride(id).await?.into())
    }

    pub async fn get(&self, id: RideId) -> Result<RideRequest, DispatchError> {
        Ok(self.backend.get_ride(id).await?)
    }

    /// Assign `driver` to a pending request.
    ///
    /// The pickup ETA comes from the driver's position; the fare estimate
    /// from the pickup-to-destination distance when both ends are known.
    pub async fn accept(
        &self,
        ride_id: RideId,
        driver: &Driver,
        driver_position: Option<Coordinates>,
    ) -> Result<RideRequest, DispatchError> {
        let ride = self.backend.get_ride(ride_id).await?;
        ride.status.transition(RideStatus::Accepted)?;

        let position = driver_position.or_else(|| driver.position());
        let pickup_km = match (position, ride.client.coordinates) {
            (Some(from), Some(to)) => Some(calculate_distance(from, to)),
            _ => None,
        };
        let eta = pickup_km.map_or(MIN_ARRIVAL_MINUTES, estimate_arrival_minutes);

        let mut snapshot = ride.driver.clone();
        snapshot.merge(DriverSnapshot::from_driver(driver, eta, position));

        let now = Utc::now();
        let trip_km = self.trip_distance(&ride).await;
        let patch = RidePatch {
            status: Some(RideStatus::Accepted),
            driver: Some(snapshot),
            fare: trip_km.map(|km| self.fares.ride_fare(km, trip_minutes(km))),
            distance_km: trip_km,
            response_seconds: Some(response_seconds(&ride, now)),
            rating: None,
        };
        let accepted = self
            .backend
            .update_ride_if(ride_id, RideStatus::Pending, &patch)
            .await
            .map_err(|e| match e {
                StoreError::Conflict { .. } => DispatchError::RideTaken(ride_id),
                e => e.into(),
            })?;

        let bump = DriverPatch {
            rides: Some(driver.rides + 1),
            ..Default::default()
        };
        if let Err(e) = self.backend.update_driver(driver.id, &bump).await {
            warn!(driver_id = driver.id, error = %e, "could not bump ride count");
        }

        info!(ride_id, driver_id = driver.id, eta, "ride accepted");
        self.events.publish(RideEvent::RideAccepted {
            ride_id,
            driver_id: driver.id,
            eta_minutes: eta,
        });
        Ok(accepted)
    }

    async fn trip_distance(&self, ride: &RideRequest) -> Option<f64> {
        let pickup = ride.client.coordinates?;
        let name = ride.destination.as_deref()?;
        let destinations = match self.backend.list_destinations(false).await {
            Ok(d) => d,
            Err(e) => {
                warn!(ride_id = ride.id, error = %e, "cannot load destinations for fare estimate");
                return None;
            }
        };
        let target = destinations.iter().find(|d| d.name == name)?.position()?;
        Some((calculate_distance(pickup, target) * 10.0).round() / 10.0)
    }

    async fn move_to(
        &self,
        ride_id: RideId,
        next: RideStatus,
    ) -> Result<RideRequest, DispatchError> {
        let ride = self.backend.get_ride(ride_id).await?;
        ride.status.transition(next)?;
        Ok(self
            .backend
            .update_ride(ride_id, &RidePatch::status(next))
            .await?)
    }

    pub async fn refuse(&self, ride_id: RideId) -> Result<RideRequest, DispatchError> {
        let ride = self.move_to(ride_id, RideStatus::Refused).await?;
        info!(ride_id, "ride refused");
        self.events.publish(RideEvent::RideRefused { ride_id });
        Ok(ride)
    }

    /// The row stays, marked `cancelado`.
    pub async fn cancel(&self, ride_id: RideId) -> Result<RideRequest, DispatchError> {
        let ride = self.move_to(ride_id, RideStatus::Cancelled).await?;
        info!(ride_id, "ride cancelled");
        self.events.publish(RideEvent::RequestCancelled { ride_id });
        Ok(ride)
    }

    /// Record in the driver snapshot that the driver reached the pickup.
    pub async fn notify_arrival(&self, ride_id: RideId) -> Result<RideRequest, DispatchError> {
        let ride = self.backend.get_ride(ride_id).await?;
        if ride.status != RideStatus::Accepted {
            return Err(DispatchError::RideNotInProgress {
                id: ride_id,
                status: ride.status,
            });
        }
        let mut snapshot = ride.driver;
        snapshot.mark_arrived(Utc::now());
        let patch = RidePatch {
            driver: Some(snapshot),
            ..Default::default()
        };
        let ride = self.backend.update_ride(ride_id, &patch).await?;
        info!(ride_id, "driver arrived");
        self.events.publish(RideEvent::DriverArrived { ride_id });
        Ok(ride)
    }

    pub async fn finish(&self, ride_id: RideId) -> Result<RideRequest, DispatchError> {
        let ride = self.move_to(ride_id, RideStatus::Completed).await?;
        info!(ride_id, fare = ?ride.fare, "ride completed");
        self.events.publish(RideEvent::RideCompleted { ride_id });
        Ok(ride)
    }

    /// Pending requests nearest-first from `driver_position`, minus refused ones.
    pub async fn pending_for_driver(
        &self,
        driver_position: Coordinates,
        refused: &HashSet<RideId>,
    ) -> Result<Vec<RankedRequest>, DispatchError> {
        let pending = self.backend.list_rides(&RideFilter::pending()).await?;
        Ok(rank_requests_by_proximity(driver_position, pending, refused))
    }

    /// Fold one rating into the driver's running average.
    ///
    /// A failure to append to the rating history is logged, not returned.
    pub async fn rate_driver(
        &self,
        driver_id: DriverId,
        stars: u8,
        comment: &str,
    ) -> Result<Driver, DispatchError> {
        let rating = Rating::new(driver_id, stars, comment)?;
        let driver = self.backend.get_driver(driver_id).await?;
        let (average, total) = updated_average(Some(driver.rating), driver.rating_count, stars);
        let patch = DriverPatch {
            rating: Some(average),
            rating_count: Some(total),
            ..Default::default()
        };
        let updated = self.backend.update_driver(driver_id, &patch).await?;
        if let Err(e) = self.backend.insert_rating(rating).await {
            warn!(driver_id, error = %e, "rating history not saved");
        }
        info!(driver_id, stars, average, "driver rated");
        Ok(updated)
    }

    /// Rate the driver of a finished ride and keep the stars on the ride too.
    pub async fn rate_ride(
        &self,
        ride_id: RideId,
        stars: u8,
        comment: &str,
    ) -> Result<Driver, DispatchError> {
        let ride = self.backend.get_ride(ride_id).await?;
        if ride.status != RideStatus::Completed {
            return Err(DispatchError::RideNotFinished {
                id: ride_id,
                status: ride.status,
            });
        }
        if ride.rating.is_some() {
            return Err(DispatchError::AlreadyRated(ride_id));
        }
        let driver_id = ride
            .driver_id()
            .ok_or(DispatchError::NoDriverAssigned(ride_id))?;
        let driver = self.rate_driver(driver_id, stars, comment).await?;
        let patch = RidePatch {
            rating: Some(f64::from(stars)),
            ..Default::default()
        };
        self.backend.update_ride(ride_id, &patch).await?;
        Ok(driver)
    }
}
