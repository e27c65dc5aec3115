//! Fare schedule and the platform/driver split.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Round a money amount to cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pricing constants in BRL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareSchedule {
    pub base_fee: f64,
    pub per_km: f64,
    pub per_minute: f64,
    /// Share of the gross fare retained by the platform.
    pub commission_rate: f64,
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self {
            base_fee: 5.0,
            per_km: 2.0,
            per_minute: 0.5,
            commission_rate: 0.15,
        }
    }
}

/// Gross fare split into platform commission and driver payout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub gross: f64,
    pub commission: f64,
    pub net: f64,
}

impl FareSchedule {
    pub fn with_commission_rate(mut self, rate: f64) -> Result<Self, CoreError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(CoreError::InvalidCommissionRate(rate));
        }
        self.commission_rate = rate;
        Ok(self)
    }

    /// Price of a ride: base fee plus distance and time components.
    pub fn ride_fare(&self, distance_km: f64, minutes: f64) -> f64 {
        round_cents(self.base_fee + distance_km * self.per_km + minutes * self.per_minute)
    }

    pub fn commission(&self, total: f64) -> f64 {
        round_cents(total * self.commission_rate)
    }

    /// What the driver keeps after commission.
    pub fn driver_net(&self, total: f64) -> f64 {
        round_cents(total - self.commission(total))
    }

    pub fn breakdown(&self, gross: f64) -> FareBreakdown {
        FareBreakdown {
            gross: round_cents(gross),
            commission: self.commission(gross),
            net: self.driver_net(gross),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fare_components() {
        let s = FareSchedule::default();
        assert_eq!(s.ride_fare(0.0, 0.0), 5.0);
        assert_eq!(s.ride_fare(10.0, 20.0), 35.0);
        assert_eq!(s.ride_fare(3.3, 7.0), 15.1);
    }

    #[test]
    fn commission_and_net_add_up() {
        let s = FareSchedule::default();
        assert_eq!(s.commission(35.0), 5.25);
        assert_eq!(s.driver_net(35.0), 29.75);

        let b = s.breakdown(123.45);
        assert_eq!(b.gross, 123.45);
        assert_eq!(round_cents(b.commission + b.net), b.gross);
    }

    #[test]
    fn commission_rate_is_validated() {
        let s = FareSchedule::default().with_commission_rate(0.2).unwrap();
        assert_eq!(s.commission(100.0), 20.0);
        assert_eq!(
            FareSchedule::default().with_commission_rate(1.5),
            Err(CoreError::InvalidCommissionRate(1.5))
        );
    }
}
