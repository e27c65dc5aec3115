//! Drop-off destinations (`destinos`) curated by the admin.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::geo::Coordinates;

pub type DestinationId = i64;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "endereco", default)]
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(rename = "ativo", default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Destination {
    pub fn from_new(id: DestinationId, new: NewDestination) -> Self {
        Self {
            id,
            name: new.name,
            address: new.address,
            latitude: new.latitude,
            longitude: new.longitude,
            active: new.active,
            created_at: Some(Utc::now()),
        }
    }

    pub fn position(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }

    pub fn apply(&mut self, patch: &DestinationPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(address) = &patch.address {
            self.address = address.clone();
        }
        if patch.latitude.is_some() {
            self.latitude = patch.latitude;
        }
        if patch.longitude.is_some() {
            self.longitude = patch.longitude;
        }
        if let Some(active) = patch.active {
            self.active = active;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDestination {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "endereco")]
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(rename = "ativo")]
    pub active: bool,
}

impl NewDestination {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            latitude: None,
            longitude: None,
            active: true,
        }
    }

    pub fn at(mut self, position: Option<Coordinates>) -> Self {
        self.latitude = position.map(|p| p.latitude);
        self.longitude = position.map(|p| p.longitude);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::MissingField("nome"));
        }
        if self.address.trim().is_empty() {
            return Err(CoreError::MissingField("endereco"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationPatch {
    #[serde(rename = "nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "endereco", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(rename = "ativo", default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}
