//! Driver payouts: monthly statements, payment status and CSV export.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use jamal_core::payment::PaymentId;
use jamal_core::{
    Driver, DriverId, FareSchedule, NewPayment, Payment, PaymentPatch, PaymentStatus,
    RideRequest, RideStatus,
};
use jamal_store::{RideFilter, SharedBackend};
use tracing::info;

use crate::DispatchError;

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self, DispatchError> {
        let m = Self { year, month };
        m.first_day()
            .map(|_| m)
            .ok_or_else(|| DispatchError::InvalidMonth(m.to_string()))
    }

    pub fn of(t: DateTime<Utc>) -> Self {
        Self {
            year: t.year(),
            month: t.month(),
        }
    }

    fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First and last instant of the month, both inclusive.
    pub fn bounds(self) -> Result<(DateTime<Utc>, DateTime<Utc>), DispatchError> {
        let invalid = || DispatchError::InvalidMonth(self.to_string());
        let start = self.first_day().ok_or_else(invalid)?;
        let next = self.next().first_day().ok_or_else(invalid)?;
        let start = start.and_hms_opt(0, 0, 0).ok_or_else(invalid)?.and_utc();
        let end = next.and_hms_opt(0, 0, 0).ok_or_else(invalid)?.and_utc()
            - TimeDelta::microseconds(1);
        Ok((start, end))
    }

    pub fn contains(self, t: DateTime<Utc>) -> bool {
        Self::of(t) == self
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DispatchError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Month::new(year, month).map_err(|_| invalid())
    }
}

#[derive(Clone)]
pub struct FinanceService {
    backend: SharedBackend,
    fares: FareSchedule,
}

impl FinanceService {
    pub fn new(backend: SharedBackend, fares: FareSchedule) -> Self {
        Self { backend, fares }
    }

    pub fn fares(&self) -> &FareSchedule {
        &self.fares
    }

    /// Record a pending payment for `rides`, split by the fare schedule.
    /// The period spans the first to the last ride.
    pub async fn generate_payment(
        &self,
        driver: &Driver,
        rides: &[RideRequest],
        gross: f64,
    ) -> Result<Payment, DispatchError> {
        let now = Utc::now();
        let start = rides.iter().map(|r| r.timestamp).min().unwrap_or(now);
        let end = rides.iter().map(|r| r.timestamp).max().unwrap_or(now);
        self.insert(driver, rides.len(), gross, start, end).await
    }

    async fn insert(
        &self,
        driver: &Driver,
        ride_count: usize,
        gross: f64,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Payment, DispatchError> {
        let split = self.fares.breakdown(gross);
        let payment = self
            .backend
            .insert_payment(NewPayment {
                driver_id: driver.id,
                driver_name: driver.name.clone(),
                ride_count: ride_count as i64,
                gross: split.gross,
                commission: split.commission,
                net: split.net,
                period_start,
                period_end,
                status: PaymentStatus::Pending,
            })
            .await?;
        info!(
            payment_id = payment.id,
            driver_id = driver.id,
            gross = split.gross,
            "payment generated"
        );
        Ok(payment)
    }

    /// Statement for one driver's finished rides in `month`.
    ///
    /// `None` when the driver finished no rides that month. Rides without a
    /// stored fare count as zero.
    pub async fn generate_monthly_payment(
        &self,
        driver_id: DriverId,
        month: Month,
    ) -> Result<Option<Payment>, DispatchError> {
        let (since, until) = month.bounds()?;
        let filter = RideFilter {
            status: Some(RideStatus::Completed),
            driver_id: Some(driver_id),
            since: Some(since),
            until: Some(until),
            ..Default::default()
        };
        let rides = self.backend.list_rides(&filter).await?;
        if rides.is_empty() {
            info!(driver_id, %month, "no finished rides in period");
            return Ok(None);
        }
        let driver = self.backend.get_driver(driver_id).await?;
        let gross: f64 = rides.iter().filter_map(|r| r.fare).sum();
        self.insert(&driver, rides.len(), gross, since, until)
            .await
            .map(Some)
    }

    /// Payments newest period first, optionally for one driver and one month.
    pub async fn list_payments(
        &self,
        driver_id: Option<DriverId>,
        month: Option<Month>,
    ) -> Result<Vec<Payment>, DispatchError> {
        let mut payments = self.backend.list_payments(driver_id).await?;
        if let Some(month) = month {
            payments.retain(|p| month.contains(p.period_start));
        }
        Ok(payments)
    }

    /// Move a payment to `status`; paying stamps `data_pagamento`.
    pub async fn update_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
        method: Option<String>,
        notes: Option<String>,
    ) -> Result<Payment, DispatchError> {
        let patch = PaymentPatch {
            status: Some(status),
            paid_at: (status == PaymentStatus::Paid).then(Utc::now),
            method,
            notes,
        };
        let payment = self.backend.update_payment(id, &patch).await?;
        info!(payment_id = id, %status, "payment status updated");
        Ok(payment)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn day(t: DateTime<Utc>) -> String {
    t.format("%d/%m/%Y").to_string()
}

/// Payments as CSV, one row per payment.
pub fn export_csv(payments: &[Payment]) -> String {
    let mut csv = String::from(
        "ID,Motorista,Total Corridas,Valor Bruto,Comissão,Valor Líquido,Período,Status,Data Pagamento\n",
    );
    for p in payments {
        let paid = p.paid_at.map_or_else(|| "-".to_string(), day);
        csv.push_str(&format!(
            "{},{},{},{:.2},{:.2},{:.2},{} a {},{},{}\n",
            p.id,
            csv_field(&p.driver_name),
            p.ride_count,
            p.gross,
            p.commission,
            p.net,
            day(p.period_start),
            day(p.period_end),
            p.status,
            paid,
        ));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jamal_core::{ClientInfo, DriverSnapshot, NewDriver, NewRideRequest, RidePatch};
    use jamal_store::{Backend, MemoryStore};

    async fn finished_ride(store: &MemoryStore, driver: &Driver, ts: &str, fare: Option<f64>) {
        let mut new = NewRideRequest::pending(ClientInfo::default(), "Centro");
        new.timestamp = ts.parse().unwrap();
        let ride = store.insert_ride(new).await.unwrap();
        let patch = RidePatch {
            status: Some(RideStatus::Completed),
            driver: Some(DriverSnapshot::from_driver(driver, 5, None)),
            fare,
            ..Default::default()
        };
        store.update_ride(ride.id, &patch).await.unwrap();
    }

    #[test]
    fn month_parsing_and_bounds() {
        let m: Month = "2026-02".parse().unwrap();
        assert_eq!(m, Month { year: 2026, month: 2 });
        let (start, end) = m.bounds().unwrap();
        assert_eq!(start.to_rfc3339(), "2026-02-01T00:00:00+00:00");
        assert_eq!(end.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-02-28 23:59:59");
        assert_eq!("2025-12".parse::<Month>().unwrap().next().to_string(), "2026-01");
        assert!("2026-13".parse::<Month>().is_err());
        assert!("feb".parse::<Month>().is_err());
    }

    #[tokio::test]
    async fn monthly_payment_sums_finished_rides_in_month() {
        let store = Arc::new(MemoryStore::new());
        let driver = store
            .insert_driver(NewDriver::new("1", "Carlos", "11", "CG", "AAA"))
            .await
            .unwrap();
        finished_ride(&store, &driver, "2026-02-01T00:00:00Z", Some(20.0)).await;
        finished_ride(&store, &driver, "2026-02-28T23:30:00Z", Some(30.0)).await;
        finished_ride(&store, &driver, "2026-02-10T12:00:00Z", None).await;
        finished_ride(&store, &driver, "2026-03-01T00:00:00Z", Some(99.0)).await;

        let finance = FinanceService::new(store.clone(), FareSchedule::default());
        let feb = Month::new(2026, 2).unwrap();
        let payment = finance
            .generate_monthly_payment(driver.id, feb)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.ride_count, 3);
        assert_eq!(payment.gross, 50.0);
        assert_eq!(payment.commission, 7.5);
        assert_eq!(payment.net, 42.5);
        assert_eq!(payment.status, PaymentStatus::Pending);

        let jan = Month::new(2026, 1).unwrap();
        assert!(finance.generate_monthly_payment(driver.id, jan).await.unwrap().is_none());

        assert_eq!(finance.list_payments(None, Some(feb)).await.unwrap().len(), 1);
        assert!(finance.list_payments(Some(driver.id), Some(jan)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn paying_stamps_date() {
        let store = Arc::new(MemoryStore::new());
        let driver = store
            .insert_driver(NewDriver::new("1", "Carlos", "11", "CG", "AAA"))
            .await
            .unwrap();
        let finance = FinanceService::new(store.clone(), FareSchedule::default());
        let p = finance.generate_payment(&driver, &[], 100.0).await.unwrap();
        assert_eq!((p.commission, p.net), (15.0, 85.0));

        let processing = finance
            .update_status(p.id, PaymentStatus::Processing, None, None)
            .await
            .unwrap();
        assert!(processing.paid_at.is_none());
        let paid = finance
            .update_status(p.id, PaymentStatus::Paid, Some("pix".into()), None)
            .await
            .unwrap();
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.method.as_deref(), Some("pix"));
    }

    #[test]
    fn csv_quotes_names_with_commas() {
        let payment = Payment::from_new(
            7,
            NewPayment {
                driver_id: 1,
                driver_name: "Silva, Carlos".into(),
                ride_count: 2,
                gross: 50.0,
                commission: 7.5,
                net: 42.5,
                period_start: "2026-02-01T00:00:00Z".parse().unwrap(),
                period_end: "2026-02-28T23:59:59Z".parse().unwrap(),
                status: PaymentStatus::Pending,
            },
        );
        let csv = export_csv(&[payment]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("ID,Motorista"));
        assert_eq!(
            lines.next().unwrap(),
            "7,\"Silva, Carlos\",2,50.00,7.50,42.50,01/02/2026 a 28/02/2026,pendente,-"
        );
    }
}
