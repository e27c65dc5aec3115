//! Driver inbox messages (`notifications`) and rating history (`avaliacoes`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::DriverId;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "tempo")]
    pub time: DateTime<Utc>,
    #[serde(rename = "lida", default)]
    pub read: bool,
    /// `None` addresses every driver.
    #[serde(default)]
    pub driver_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        driver_code: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            message: message.into(),
            time: Utc::now(),
            read: false,
            driver_code,
            created_at: None,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.driver_code.is_none()
    }

    /// Addressed to `code`, or to everyone.
    pub fn is_visible_to(&self, code: &str) -> bool {
        match &self.driver_code {
            None => true,
            Some(c) => c == code,
        }
    }
}

/// One client rating of a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "motorista_id")]
    pub driver_id: DriverId,
    #[serde(rename = "estrelas")]
    pub stars: u8,
    #[serde(rename = "comentario", default)]
    pub comment: String,
    #[serde(rename = "data")]
    pub date: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        driver_id: DriverId,
        stars: u8,
        comment: impl Into<String>,
    ) -> Result<Self, CoreError> {
        if !(1..=5).contains(&stars) {
            return Err(CoreError::InvalidRating(stars));
        }
        Ok(Self {
            driver_id,
            stars,
            comment: comment.into(),
            date: Utc::now(),
        })
    }
}

/// Running average after one more rating, with an unrated driver counted as 5.0.
pub fn updated_average(current: Option<f64>, count: Option<i64>, stars: u8) -> (f64, i64) {
    let total = count.unwrap_or(0) + 1;
    let current = current.unwrap_or(crate::driver::DEFAULT_RATING);
    let average = (current * (total - 1) as f64 + stars as f64) / total as f64;
    (average, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility() {
        let own = Notification::new("t", "m", Some("1234".into()));
        let all = Notification::new("t", "m", None);
        assert!(own.is_visible_to("1234"));
        assert!(!own.is_visible_to("5678"));
        assert!(all.is_visible_to("5678"));
        assert!(all.is_broadcast());
        assert_ne!(own.id, all.id);
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(1, 5, "ótimo").is_ok());
        assert_eq!(Rating::new(1, 0, "").unwrap_err(), CoreError::InvalidRating(0));
        assert_eq!(Rating::new(1, 6, "").unwrap_err(), CoreError::InvalidRating(6));
    }

    #[test]
    fn running_average() {
        assert_eq!(updated_average(None, None, 3), (3.0, 1));
        assert_eq!(updated_average(Some(4.0), Some(1), 5), (4.5, 2));
        let (avg, n) = updated_average(Some(4.8), Some(9), 1);
        assert_eq!(n, 10);
        assert!((avg - 4.42).abs() < 1e-9);
    }
}
