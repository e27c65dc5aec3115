//! Great-circle distance, arrival estimates and the offline geocoder.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the Haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average urban motorcycle speed used for arrival estimates.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

pub const MIN_ARRIVAL_MINUTES: u32 = 5;
pub const MAX_ARRIVAL_MINUTES: u32 = 30;

/// Pickup point assumed when a client shares no position (São Paulo centre).
pub const DEFAULT_PICKUP: Coordinates = Coordinates {
    latitude: -23.5505,
    longitude: -46.6333,
};

const GEOCODE_BASE: Coordinates = Coordinates {
    latitude: -23.55,
    longitude: -46.63,
};
const GEOCODE_SPREAD_DEG: f64 = 0.1;

/// A WGS84 position.
///
/// Rows written by older clients carry positions as `{lat, lon}` objects or
/// `[longitude, latitude]` pairs; all three shapes deserialize into this type,
/// and it always serializes as `{latitude, longitude}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CoordinatesRepr")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CoordinatesRepr {
    Named { latitude: f64, longitude: f64 },
    Short { lat: f64, lon: f64 },
    Pair([f64; 2]),
}

impl From<CoordinatesRepr> for Coordinates {
    fn from(repr: CoordinatesRepr) -> Self {
        match repr {
            CoordinatesRepr::Named {
                latitude,
                longitude,
            } => Self {
                latitude,
                longitude,
            },
            CoordinatesRepr::Short { lat, lon } => Self {
                latitude: lat,
                longitude: lon,
            },
            CoordinatesRepr::Pair([longitude, latitude]) => Self {
                latitude,
                longitude,
            },
        }
    }
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine distance between two points in kilometres, rounded to one decimal.
pub fn calculate_distance(origin: Coordinates, destination: Coordinates) -> f64 {
    let d_lat = (destination.latitude - origin.latitude).to_radians();
    let d_lon = (destination.longitude - origin.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + origin.latitude.to_radians().cos()
            * destination.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    let distance = EARTH_RADIUS_KM * c;
    (distance * 10.0).round() / 10.0
}

/// Minutes a driver needs to cover `distance_km`, clamped to `5..=30`.
pub fn estimate_arrival_minutes(distance_km: f64) -> u32 {
    let minutes = (distance_km * 60.0 / AVERAGE_SPEED_KMH).ceil();
    if !minutes.is_finite() {
        return MIN_ARRIVAL_MINUTES;
    }
    minutes.clamp(MIN_ARRIVAL_MINUTES as f64, MAX_ARRIVAL_MINUTES as f64) as u32
}

/// Offline geocoder.
///
/// There is no geocoding provider behind this: an address maps to a point
/// within ±0.05° of central São Paulo. The offset is derived from a hash of
/// the normalised address, so the same address always lands on the same
/// point. Blank addresses yield `None`.
pub fn geocode_address(address: &str) -> Option<Coordinates> {
    let normalized = address.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let hash = fnv1a(normalized.as_bytes());
    let lat_unit = (hash & 0xffff_ffff) as f64 / u32::MAX as f64;
    let lon_unit = (hash >> 32) as f64 / u32::MAX as f64;
    Some(Coordinates {
        latitude: GEOCODE_BASE.latitude + (lat_unit - 0.5) * GEOCODE_SPREAD_DEG,
        longitude: GEOCODE_BASE.longitude + (lon_unit - 0.5) * GEOCODE_SPREAD_DEG,
    })
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Driving directions URL for a pickup.
///
/// Coordinates win when present; otherwise the free-text address becomes a
/// map search.
pub fn navigation_url(coordinates: Option<Coordinates>, address: &str) -> String {
    match coordinates {
        Some(c) => format!(
            "https://www.google.com/maps/dir/?api=1&destination={},{}&travelmode=driving",
            c.latitude, c.longitude
        ),
        None => format!(
            "https://www.google.com/maps/search/?api=1&query={}",
            encode_uri_component(address)
        ),
    }
}

fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_same_point_is_zero() {
        assert_eq!(calculate_distance(DEFAULT_PICKUP, DEFAULT_PICKUP), 0.0);
    }

    #[test]
    fn distance_sao_paulo_to_rio() {
        let sp = Coordinates::new(-23.5505, -46.6333);
        let rio = Coordinates::new(-22.9068, -43.1729);
        let d = calculate_distance(sp, rio);
        assert!((355.0..365.0).contains(&d), "got {d}");
    }

    #[test]
    fn distance_is_rounded_to_one_decimal() {
        let a = Coordinates::new(-23.55, -46.63);
        let b = Coordinates::new(-23.56, -46.64);
        let d = calculate_distance(a, b);
        assert_eq!((d * 10.0).round() / 10.0, d);
        assert!(d > 0.0);
    }

    #[test]
    fn arrival_is_clamped() {
        assert_eq!(estimate_arrival_minutes(0.0), 5);
        assert_eq!(estimate_arrival_minutes(1.0), 5);
        assert_eq!(estimate_arrival_minutes(5.0), 10);
        assert_eq!(estimate_arrival_minutes(5.1), 11);
        assert_eq!(estimate_arrival_minutes(100.0), 30);
        assert_eq!(estimate_arrival_minutes(f64::NAN), 5);
    }

    #[test]
    fn coordinates_accept_legacy_shapes() {
        let named: Coordinates =
            serde_json::from_str(r#"{"latitude": -23.5, "longitude": -46.6}"#).unwrap();
        let short: Coordinates = serde_json::from_str(r#"{"lat": -23.5, "lon": -46.6}"#).unwrap();
        let pair: Coordinates = serde_json::from_str("[-46.6, -23.5]").unwrap();
        assert_eq!(named, short);
        assert_eq!(named, pair);

        let json = serde_json::to_value(pair).unwrap();
        assert_eq!(json["latitude"], -23.5);
        assert_eq!(json["longitude"], -46.6);
    }

    #[test]
    fn geocode_is_stable_and_near_base() {
        let a = geocode_address("Av. Paulista, 1000").unwrap();
        let b = geocode_address("  av. paulista, 1000 ").unwrap();
        assert_eq!(a, b);
        assert!((a.latitude - GEOCODE_BASE.latitude).abs() <= 0.05);
        assert!((a.longitude - GEOCODE_BASE.longitude).abs() <= 0.05);
        assert!(geocode_address("   ").is_none());
    }

    #[test]
    fn navigation_prefers_coordinates() {
        let url = navigation_url(Some(Coordinates::new(-23.5, -46.6)), "ignored");
        assert_eq!(
            url,
            "https://www.google.com/maps/dir/?api=1&destination=-23.5,-46.6&travelmode=driving"
        );
        let url = navigation_url(None, "Rua A, 10");
        assert_eq!(
            url,
            "https://www.google.com/maps/search/?api=1&query=Rua%20A%2C%2010"
        );
    }
}
