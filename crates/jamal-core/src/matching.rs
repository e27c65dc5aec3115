//! Proximity ranking between drivers and waiting clients.

use std::collections::HashSet;

use crate::driver::Driver;
use crate::geo::{Coordinates, DEFAULT_PICKUP, calculate_distance};
use crate::ride::{RideId, RideRequest};

/// A pending request as seen from one driver's position.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRequest {
    pub request: RideRequest,
    /// Kilometres from the driver to the pickup point.
    pub pickup_km: f64,
}

impl RankedRequest {
    pub fn id(&self) -> RideId {
        self.request.id
    }
}

/// Rank requests nearest-first, skipping the ones this driver refused.
///
/// Requests without client coordinates are measured against
/// [`DEFAULT_PICKUP`]. The sort is stable, so equally distant requests keep
/// their incoming (oldest-first) order.
pub fn rank_requests_by_proximity(
    driver_position: Coordinates,
    requests: Vec<RideRequest>,
    refused: &HashSet<RideId>,
) -> Vec<RankedRequest> {
    let mut ranked: Vec<RankedRequest> = requests
        .into_iter()
        .filter(|r| !refused.contains(&r.id))
        .map(|request| {
            let pickup = request.client.coordinates.unwrap_or(DEFAULT_PICKUP);
            RankedRequest {
                pickup_km: calculate_distance(driver_position, pickup),
                request,
            }
        })
        .collect();
    ranked.sort_by(|a, b| a.pickup_km.total_cmp(&b.pickup_km));
    ranked
}

/// Closest available driver with a known position.
pub fn nearest_driver(pickup: Coordinates, drivers: &[Driver]) -> Option<(&Driver, f64)> {
    drivers
        .iter()
        .filter(|d| d.is_available())
        .filter_map(|d| d.position().map(|p| (d, calculate_distance(p, pickup))))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
