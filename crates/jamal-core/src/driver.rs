//! Driver profiles (`drivers`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo::Coordinates;

pub type DriverId = i64;

pub const DEFAULT_PHOTO: &str = "/placeholder.svg?height=100&width=100";
pub const DEFAULT_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Online,
    #[default]
    Offline,
}

impl DriverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverStatus::Online => "online",
            DriverStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DriverStatus::Online),
            "offline" => Ok(DriverStatus::Offline),
            other => Err(CoreError::UnknownVariant {
                kind: "driver status",
                value: other.to_string(),
            }),
        }
    }
}

fn default_rating() -> f64 {
    DEFAULT_RATING
}

fn default_true() -> bool {
    true
}

/// A row of the `drivers` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    /// Access code the driver logs in with. Unique.
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "telefone", default)]
    pub phone: String,
    #[serde(rename = "avaliacao", default = "default_rating")]
    pub rating: f64,
    #[serde(rename = "veiculo", default)]
    pub vehicle: String,
    #[serde(rename = "placa", default)]
    pub plate: String,
    #[serde(rename = "foto", default)]
    pub photo: Option<String>,
    /// Rides accepted so far.
    #[serde(rename = "corridas", default)]
    pub rides: i64,
    #[serde(default)]
    pub status: DriverStatus,
    #[serde(rename = "ativo", default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(rename = "avaliacoes_total", default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<i64>,
}

impl Driver {
    pub fn from_new(id: DriverId, new: NewDriver) -> Self {
        Self {
            id,
            code: new.code,
            name: new.name,
            phone: new.phone,
            rating: new.rating,
            vehicle: new.vehicle,
            plate: new.plate,
            photo: new.photo,
            rides: new.rides,
            status: new.status,
            active: new.active,
            created_at: Some(Utc::now()),
            latitude: None,
            longitude: None,
            rating_count: None,
        }
    }

    /// Online and not deactivated by an admin.
    pub fn is_available(&self) -> bool {
        self.active && self.status == DriverStatus::Online
    }

    pub fn position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    pub fn photo_or_placeholder(&self) -> &str {
        self.photo.as_deref().unwrap_or(DEFAULT_PHOTO)
    }

    pub fn apply(&mut self, patch: &DriverPatch) {
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(v) = &patch.$field {
                    self.$field = v.clone();
                })*
            };
        }
        set!(code, name, phone, rating, vehicle, plate, rides, status, active);
        if patch.photo.is_some() {
            self.photo = patch.photo.clone();
        }
        if patch.latitude.is_some() {
            self.latitude = patch.latitude;
        }
        if patch.longitude.is_some() {
            self.longitude = patch.longitude;
        }
        if patch.rating_count.is_some() {
            self.rating_count = patch.rating_count;
        }
    }
}

/// Insert payload for `drivers`, defaults already applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDriver {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "avaliacao")]
    pub rating: f64,
    #[serde(rename = "veiculo")]
    pub vehicle: String,
    #[serde(rename = "placa")]
    pub plate: String,
    #[serde(rename = "foto")]
    pub photo: Option<String>,
    #[serde(rename = "corridas")]
    pub rides: i64,
    pub status: DriverStatus,
    #[serde(rename = "ativo")]
    pub active: bool,
}

impl NewDriver {
    /// A fresh driver: rating 5.0, no rides, offline, active.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        phone: impl Into<String>,
        vehicle: impl Into<String>,
        plate: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            phone: phone.into(),
            rating: DEFAULT_RATING,
            vehicle: vehicle.into(),
            plate: plate.into(),
            photo: Some(DEFAULT_PHOTO.to_string()),
            rides: 0,
            status: DriverStatus::Offline,
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("codigo", &self.code),
            ("nome", &self.name),
            ("telefone", &self.phone),
            ("veiculo", &self.vehicle),
            ("placa", &self.plate),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Partial update for `drivers`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverPatch {
    #[serde(rename = "codigo", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "avaliacao", default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(rename = "veiculo", default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<String>,
    #[serde(rename = "placa", default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    #[serde(rename = "foto", default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(rename = "corridas", default, skip_serializing_if = "Option::is_none")]
    pub rides: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DriverStatus>,
    #[serde(rename = "ativo", default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(rename = "avaliacoes_total", default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<i64>,
}

impl DriverPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Demo fleet inserted into an empty `drivers` table.
pub fn default_fleet() -> Vec<NewDriver> {
    let mut carlos = NewDriver::new(
        "1234",
        "Carlos Silva",
        "11999990000",
        "Honda CG 160",
        "ABC-1234",
    );
    carlos.rating = 4.8;
    carlos.rides = 145;
    carlos.status = DriverStatus::Online;

    let mut ana = NewDriver::new(
        "5678",
        "Ana Santos",
        "11988880000",
        "Yamaha Factor 150",
        "XYZ-5678",
    );
    ana.rating = 4.9;
    ana.rides = 89;

    let mut roberto = NewDriver::new(
        "9012",
        "Roberto Oliveira",
        "11977770000",
        "Honda PCX 150",
        "DEF-9012",
    );
    roberto.rating = 4.7;
    roberto.rides = 212;
    roberto.status = DriverStatus::Online;

    vec![carlos, ana, roberto]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_defaults() {
        let d: Driver = serde_json::from_str(
            r#"{"id": 1, "codigo": "1234", "nome": "Carlos Silva"}"#,
        )
        .unwrap();
        assert_eq!(d.rating, 5.0);
        assert_eq!(d.status, DriverStatus::Offline);
        assert!(d.active);
        assert!(!d.is_available());
        assert_eq!(d.photo_or_placeholder(), DEFAULT_PHOTO);
        assert!(d.position().is_none());
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut d = Driver::from_new(1, NewDriver::new("1", "A", "11", "CG", "AAA-0000"));
        let patch = DriverPatch {
            status: Some(DriverStatus::Online),
            latitude: Some(-23.5),
            longitude: Some(-46.6),
            ..Default::default()
        };
        d.apply(&patch);
        assert!(d.is_available());
        assert_eq!(d.name, "A");
        assert_eq!(d.position(), Some(Coordinates::new(-23.5, -46.6)));

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["status"], "online");
        assert!(json.get("nome").is_none());
    }

    #[test]
    fn validate_reports_first_missing_field() {
        let d = NewDriver::new("9", " ", "11", "CG", "AAA");
        assert_eq!(d.validate(), Err(CoreError::MissingField("nome")));
        assert!(NewDriver::new("9", "B", "11", "CG", "AAA").validate().is_ok());
    }

    #[test]
    fn default_fleet_has_unique_codes() {
        let fleet = default_fleet();
        assert_eq!(fleet.len(), 3);
        let online = fleet.iter().filter(|d| d.status == DriverStatus::Online).count();
        assert_eq!(online, 2);
        let mut codes: Vec<_> = fleet.iter().map(|d| d.code.as_str()).collect();
        codes.dedup();
        assert_eq!(codes.len(), 3);
    }
}
