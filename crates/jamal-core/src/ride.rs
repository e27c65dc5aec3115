//! Ride requests (`solicitacoes`) and the driver snapshot embedded in them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::driver::{Driver, DriverId};
use crate::error::CoreError;
use crate::geo::Coordinates;

pub type RideId = i64;

/// Snapshot `status` value written when the driver reaches the pickup.
pub const ARRIVED: &str = "chegou";

/// Lifecycle of a ride request.
///
/// ```text
/// pendente ──► aceito ──► finalizada
///    │            │
///    │            └──► cancelado
///    ├──► cancelado
///    └──► recusado_por_motorista
/// ```
///
/// Driver arrival is not a status of its own; it is recorded in the
/// [`DriverSnapshot`] while the ride stays `aceito`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RideStatus {
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "aceito")]
    Accepted,
    #[serde(rename = "recusado_por_motorista")]
    Refused,
    #[serde(rename = "cancelado")]
    Cancelled,
    #[serde(rename = "finalizada")]
    Completed,
}

impl RideStatus {
    pub const ALL: [RideStatus; 5] = [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::Refused,
        RideStatus::Cancelled,
        RideStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Pending => "pendente",
            RideStatus::Accepted => "aceito",
            RideStatus::Refused => "recusado_por_motorista",
            RideStatus::Cancelled => "cancelado",
            RideStatus::Completed => "finalizada",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RideStatus::Refused | RideStatus::Cancelled | RideStatus::Completed
        )
    }

    pub fn can_transition_to(self, next: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Refused)
                | (Pending, Cancelled)
                | (Accepted, Cancelled)
                | (Accepted, Completed)
        )
    }

    /// Validate a move, returning the target status on success.
    pub fn transition(self, next: RideStatus) -> Result<RideStatus, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RideStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "ride status",
                value: s.to_string(),
            })
    }
}

/// Who asked for the ride and where to pick them up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "telefone", default)]
    pub phone: String,
    /// Human-readable pickup address.
    #[serde(rename = "localizacao", default)]
    pub address: String,
    #[serde(rename = "coordenadas", default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

/// Copy of the accepting driver's profile stored on the ride row.
///
/// Empty (`{}`) while the ride is pending. Keys this type does not know are
/// kept in `extra` so a read-modify-write does not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DriverId>,
    #[serde(rename = "nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "foto", default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(rename = "veiculo", default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(rename = "placa", default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Estimated minutes until pickup.
    #[serde(rename = "tempoEspera", default, skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<u32>,
    #[serde(rename = "coordenadas", default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "chegou_timestamp", default, skip_serializing_if = "Option::is_none")]
    pub arrived_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DriverSnapshot {
    pub fn from_driver(
        driver: &Driver,
        eta_minutes: u32,
        coordinates: Option<Coordinates>,
    ) -> Self {
        Self {
            id: Some(driver.id),
            name: Some(driver.name.clone()),
            photo: Some(driver.photo_or_placeholder().to_string()),
            vehicle: Some(driver.vehicle.clone()),
            plate: Some(driver.plate.clone()),
            phone: Some(driver.phone.clone()),
            eta_minutes: Some(eta_minutes),
            coordinates,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }

    pub fn has_arrived(&self) -> bool {
        self.status.as_deref() == Some(ARRIVED) || self.arrived_at.is_some()
    }

    pub fn mark_arrived(&mut self, at: DateTime<Utc>) {
        self.status = Some(ARRIVED.to_string());
        self.arrived_at = Some(at);
    }

    /// Overlay every field set in `other` onto `self`.
    pub fn merge(&mut self, other: DriverSnapshot) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(id, name, photo, vehicle, plate, phone, eta_minutes, coordinates, status, arrived_at);
        self.extra.extend(other.extra);
    }
}

/// A row of the `solicitacoes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: RideId,
    #[serde(rename = "cliente", deserialize_with = "embedded_json")]
    pub client: ClientInfo,
    #[serde(rename = "motorista", default, deserialize_with = "embedded_json")]
    pub driver: DriverSnapshot,
    /// Destination name.
    #[serde(rename = "destino", default)]
    pub destination: Option<String>,
    pub status: RideStatus,
    /// When the client sent the request.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "valor", default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    #[serde(rename = "distancia", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    /// Seconds between the request and its acceptance.
    #[serde(rename = "tempo_resposta", default, skip_serializing_if = "Option::is_none")]
    pub response_seconds: Option<i64>,
    #[serde(rename = "avaliacao", default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RideRequest {
    pub fn from_new(id: RideId, new: NewRideRequest) -> Self {
        Self {
            id,
            client: new.client,
            driver: new.driver,
            destination: new.destination,
            status: new.status,
            timestamp: new.timestamp,
            fare: None,
            distance_km: None,
            response_seconds: None,
            rating: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Driver id from the snapshot, if the ride has been taken.
    pub fn driver_id(&self) -> Option<DriverId> {
        self.driver.id
    }

    pub fn apply(&mut self, patch: &RidePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(driver) = &patch.driver {
            self.driver = driver.clone();
        }
        if patch.fare.is_some() {
            self.fare = patch.fare;
        }
        if patch.distance_km.is_some() {
            self.distance_km = patch.distance_km;
        }
        if patch.response_seconds.is_some() {
            self.response_seconds = patch.response_seconds;
        }
        if patch.rating.is_some() {
            self.rating = patch.rating;
        }
    }
}

/// Insert payload for `solicitacoes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRideRequest {
    #[serde(rename = "cliente")]
    pub client: ClientInfo,
    #[serde(rename = "motorista")]
    pub driver: DriverSnapshot,
    #[serde(rename = "destino")]
    pub destination: Option<String>,
    pub status: RideStatus,
    pub timestamp: DateTime<Utc>,
}

impl NewRideRequest {
    pub fn pending(client: ClientInfo, destination: impl Into<String>) -> Self {
        Self {
            client,
            driver: DriverSnapshot::default(),
            destination: Some(destination.into()),
            status: RideStatus::Pending,
            timestamp: Utc::now(),
        }
    }
}

/// Partial update for `solicitacoes`. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RidePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RideStatus>,
    #[serde(rename = "motorista", default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverSnapshot>,
    #[serde(rename = "valor", default, skip_serializing_if = "Option::is_none")]
    pub fare: Option<f64>,
    #[serde(rename = "distancia", default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(rename = "tempo_resposta", default, skip_serializing_if = "Option::is_none")]
    pub response_seconds: Option<i64>,
    #[serde(rename = "avaliacao", default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl RidePatch {
    pub fn status(status: RideStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// JSON columns sometimes arrive double-encoded as strings. Accept an object,
/// a string holding an object, or null (→ default).
fn embedded_json<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(T::default()),
        Value::String(raw) => match serde_json::from_str(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable embedded JSON column, using default");
                Ok(T::default())
            }
        },
        other => serde_json::from_value(other).map_err(D::Error::custom),
    }
}
