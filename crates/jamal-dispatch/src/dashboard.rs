//! Admin reporting over a trailing window of rides.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use jamal_core::fare::round_cents;
use jamal_core::{CoreError, Driver, DriverId, FareSchedule, RideRequest, RideStatus};
use jamal_store::{DriverFilter, RideFilter, SharedBackend, SortOrder};
use serde::Serialize;
use tracing::info;

use crate::DispatchError;
use crate::finance::Month;
use crate::rides::trip_minutes;

/// Reporting window, counted back from now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Period {
    #[default]
    #[serde(rename = "7dias")]
    Week,
    #[serde(rename = "30dias")]
    Month,
    #[serde(rename = "90dias")]
    Quarter,
    #[serde(rename = "365dias")]
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Week, Period::Month, Period::Quarter, Period::Year];

    pub fn days(self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
            Period::Year => 365,
        }
    }

    /// Long windows also get a month-by-month revenue table.
    pub fn has_monthly_breakdown(self) -> bool {
        matches!(self, Period::Quarter | Period::Year)
    }

    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::days(self.days())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

impl FromStr for Period {
    type Err = DispatchError;

    /// Accepts `7`, `7d` or `7dias` (and the same for 30, 90, 365).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .trim_end_matches("dias")
            .trim_end_matches('d');
        Period::ALL
            .into_iter()
            .find(|p| digits.parse::<i64>().is_ok_and(|d| d == p.days()))
            .ok_or_else(|| {
                CoreError::UnknownVariant {
                    kind: "period",
                    value: s.to_string(),
                }
                .into()
            })
    }
}

/// Totals across every ride in the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneralStats {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub refused: usize,
    pub cancelled: usize,
    pub completed: usize,
    pub active_drivers: usize,
    /// Gross fares of finished rides.
    pub revenue: f64,
    pub commission: f64,
    pub driver_payouts: f64,
    /// Revenue per finished ride.
    pub average_ticket: f64,
    /// Mean seconds to acceptance, over rides that recorded one.
    pub average_response_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverStats {
    pub id: DriverId,
    pub name: String,
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub average_response_seconds: f64,
    pub rating: f64,
    pub revenue: f64,
    pub commission: f64,
    pub payout: f64,
}

impl DriverStats {
    fn new(driver: &Driver) -> Self {
        Self {
            id: driver.id,
            name: driver.name.clone(),
            total: 0,
            completed: 0,
            cancelled: 0,
            average_response_seconds: 0.0,
            rating: driver.rating,
            revenue: 0.0,
            commission: 0.0,
            payout: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`.
    pub month: String,
    pub revenue: f64,
    pub commission: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub period: Period,
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// Newest first.
    pub rides: Vec<RideRequest>,
    pub stats: GeneralStats,
    /// Drivers with at least one ride, busiest first.
    pub drivers: Vec<DriverStats>,
    /// Oldest month first; empty for short windows.
    pub monthly: Vec<MonthlyRevenue>,
}

impl DashboardReport {
    /// Rides of the window, optionally narrowed to one status.
    pub fn filter_status(&self, status: Option<RideStatus>) -> Vec<&RideRequest> {
        self.rides
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect()
    }
}

#[derive(Clone)]
pub struct Dashboard {
    backend: SharedBackend,
    fares: FareSchedule,
}

impl Dashboard {
    pub fn new(backend: SharedBackend, fares: FareSchedule) -> Self {
        Self { backend, fares }
    }

    pub async fn report(&self, period: Period) -> Result<DashboardReport, DispatchError> {
        self.report_at(period, Utc::now()).await
    }

    pub async fn report_at(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<DashboardReport, DispatchError> {
        let since = period.since(now);
        let filter = RideFilter {
            since: Some(since),
            until: Some(now),
            order: SortOrder::Descending,
            ..Default::default()
        };
        let all_drivers = DriverFilter::default();
        let (rides, drivers) = futures::try_join!(
            self.backend.list_rides(&filter),
            self.backend.list_drivers(&all_drivers),
        )?;

        let stats = self.general_stats(&rides, &drivers);
        let driver_stats = self.driver_stats(&rides, &drivers);
        let monthly = if period.has_monthly_breakdown() {
            self.monthly(&rides)
        } else {
            Vec::new()
        };
        info!(%period, rides = rides.len(), drivers = driver_stats.len(), "dashboard report built");
        Ok(DashboardReport {
            period,
            since,
            generated_at: now,
            rides,
            stats,
            drivers: driver_stats,
            monthly,
        })
    }

    /// Stored fare, else priced from the stored distance, else zero.
    pub fn fare_of(&self, ride: &RideRequest) -> f64 {
        ride.fare
            .or_else(|| {
                ride.distance_km
                    .map(|km| self.fares.ride_fare(km, trip_minutes(km)))
            })
            .unwrap_or(0.0)
    }

    fn general_stats(&self, rides: &[RideRequest], drivers: &[Driver]) -> GeneralStats {
        let count = |status: RideStatus| rides.iter().filter(|r| r.status == status).count();
        let mut stats = GeneralStats {
            total: rides.len(),
            pending: count(RideStatus::Pending),
            accepted: count(RideStatus::Accepted),
            refused: count(RideStatus::Refused),
            cancelled: count(RideStatus::Cancelled),
            completed: count(RideStatus::Completed),
            active_drivers: drivers.iter().filter(|d| d.active).count(),
            ..Default::default()
        };

        let finished: Vec<f64> = rides
            .iter()
            .filter(|r| r.status == RideStatus::Completed)
            .map(|r| self.fare_of(r))
            .collect();
        if !finished.is_empty() {
            let revenue: f64 = finished.iter().sum();
            let commission: f64 = finished.iter().map(|f| self.fares.commission(*f)).sum();
            stats.revenue = round_cents(revenue);
            stats.commission = round_cents(commission);
            stats.driver_payouts = round_cents(revenue - commission);
            stats.average_ticket = round_cents(revenue / finished.len() as f64);
        }

        let times: Vec<i64> = rides
            .iter()
            .filter_map(|r| r.response_seconds)
            .filter(|s| *s > 0)
            .collect();
        if !times.is_empty() {
            let mean = times.iter().sum::<i64>() as f64 / times.len() as f64;
            stats.average_response_seconds = mean.round() as i64;
        }
        stats
    }

    fn driver_stats(&self, rides: &[RideRequest], drivers: &[Driver]) -> Vec<DriverStats> {
        let mut by_id: HashMap<DriverId, (DriverStats, Vec<i64>)> = drivers
            .iter()
            .map(|d| (d.id, (DriverStats::new(d), Vec::new())))
            .collect();

        for ride in rides {
            let Some(id) = ride.driver_id() else {
                continue;
            };
            // Rides of deleted drivers are skipped.
            let Some((stats, times)) = by_id.get_mut(&id) else {
                continue;
            };
            stats.total += 1;
            match ride.status {
                RideStatus::Completed => {
                    let fare = self.fare_of(ride);
                    let commission = self.fares.commission(fare);
                    stats.completed += 1;
                    stats.revenue += fare;
                    stats.commission += commission;
                    stats.payout += fare - commission;
                }
                RideStatus::Cancelled => stats.cancelled += 1,
                _ => {}
            }
            if let Some(secs) = ride.response_seconds.filter(|s| *s > 0) {
                times.push(secs);
            }
        }

        let mut out: Vec<DriverStats> = by_id
            .into_values()
            .filter(|(s, _)| s.total > 0)
            .map(|(mut s, times)| {
                if !times.is_empty() {
                    s.average_response_seconds =
                        times.iter().sum::<i64>() as f64 / times.len() as f64;
                }
                s.revenue = round_cents(s.revenue);
                s.commission = round_cents(s.commission);
                s.payout = round_cents(s.payout);
                s
            })
            .collect();
        out.sort_by(|a, b| b.total.cmp(&a.total).then(a.id.cmp(&b.id)));
        out
    }

    fn monthly(&self, rides: &[RideRequest]) -> Vec<MonthlyRevenue> {
        let mut months: BTreeMap<Month, (f64, f64)> = BTreeMap::new();
        for ride in rides.iter().filter(|r| r.status == RideStatus::Completed) {
            let fare = self.fare_of(ride);
            let entry = months.entry(Month::of(ride.timestamp)).or_default();
            entry.0 += fare;
            entry.1 += self.fares.commission(fare);
        }
        months
            .into_iter()
            .map(|(month, (revenue, commission))| MonthlyRevenue {
                month: month.to_string(),
                revenue: round_cents(revenue),
                commission: round_cents(commission),
                payout: round_cents(revenue - commission),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jamal_core::{ClientInfo, DriverSnapshot, NewDriver, NewRideRequest, RidePatch};
    use jamal_store::{Backend, MemoryStore};

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    async fn ride(
        store: &MemoryStore,
        driver: Option<&Driver>,
        ts: &str,
        status: RideStatus,
        fare: Option<f64>,
        distance_km: Option<f64>,
        response_seconds: Option<i64>,
    ) {
        let mut new = NewRideRequest::pending(ClientInfo::default(), "Centro");
        new.timestamp = at(ts);
        let id = store.insert_ride(new).await.unwrap().id;
        let patch = RidePatch {
            status: Some(status),
            driver: driver.map(|d| DriverSnapshot::from_driver(d, 5, None)),
            fare,
            distance_km,
            response_seconds,
            rating: None,
        };
        store.update_ride(id, &patch).await.unwrap();
    }

    async fn fixture() -> (Arc<MemoryStore>, Dashboard) {
        let store = Arc::new(MemoryStore::new());
        let carlos = store
            .insert_driver(NewDriver::new("1234", "Carlos", "11", "CG", "AAA"))
            .await
            .unwrap();
        let ana = store
            .insert_driver(NewDriver::new("5678", "Ana", "11", "Biz", "BBB"))
            .await
            .unwrap();
        store
            .insert_driver(NewDriver::new("9012", "Roberto", "11", "XRE", "CCC"))
            .await
            .unwrap();

        let s = &*store;
        ride(
            s,
            Some(&carlos),
            "2026-03-01T10:00:00Z",
            RideStatus::Completed,
            Some(20.0),
            None,
            Some(30),
        )
        .await;
        ride(
            s,
            Some(&carlos),
            "2026-04-10T10:00:00Z",
            RideStatus::Completed,
            None,
            Some(10.0),
            Some(60),
        )
        .await;
        ride(
            s,
            Some(&carlos),
            "2026-04-11T10:00:00Z",
            RideStatus::Cancelled,
            None,
            None,
            None,
        )
        .await;
        ride(
            s,
            Some(&ana),
            "2026-04-12T10:00:00Z",
            RideStatus::Completed,
            None,
            None,
            Some(90),
        )
        .await;
        ride(s, None, "2026-04-13T10:00:00Z", RideStatus::Pending, None, None, None).await;
        ride(s, None, "2025-01-01T10:00:00Z", RideStatus::Completed, Some(500.0), None, None).await;

        let dashboard = Dashboard::new(store.clone(), FareSchedule::default());
        (store, dashboard)
    }

    #[test]
    fn period_parsing() {
        assert_eq!("7".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Month);
        assert_eq!("90dias".parse::<Period>().unwrap(), Period::Quarter);
        assert_eq!(" 365 ".parse::<Period>().unwrap(), Period::Year);
        assert!("14".parse::<Period>().is_err());
        assert!(Period::Year.has_monthly_breakdown());
        assert!(!Period::Month.has_monthly_breakdown());
    }

    #[tokio::test]
    async fn general_stats_cover_window_only() {
        let (_store, dashboard) = fixture().await;
        let report = dashboard
            .report_at(Period::Quarter, at("2026-04-20T00:00:00Z"))
            .await
            .unwrap();

        let s = &report.stats;
        assert_eq!(s.total, 5);
        assert_eq!((s.completed, s.cancelled, s.pending), (3, 1, 1));
        assert_eq!(s.active_drivers, 3);
        // 20 stored + (5 + 10*2 + 20*0.5) priced from distance + 0 unknown
        assert_eq!(s.revenue, 55.0);
        assert_eq!(s.commission, 8.25);
        assert_eq!(s.driver_payouts, 46.75);
        assert_eq!(s.average_ticket, 18.33);
        assert_eq!(s.average_response_seconds, 60);
        assert_eq!(report.rides[0].status, RideStatus::Pending);
    }

    #[tokio::test]
    async fn drivers_ranked_by_rides_and_months_ascending() {
        let (_store, dashboard) = fixture().await;
        let report = dashboard
            .report_at(Period::Quarter, at("2026-04-20T00:00:00Z"))
            .await
            .unwrap();

        let names: Vec<_> = report.drivers.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Carlos", "Ana"]);
        let carlos = &report.drivers[0];
        assert_eq!((carlos.total, carlos.completed, carlos.cancelled), (3, 2, 1));
        assert_eq!(carlos.revenue, 55.0);
        assert_eq!(carlos.average_response_seconds, 45.0);

        let months: Vec<_> = report.monthly.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2026-03", "2026-04"]);
        assert_eq!(report.monthly[1].revenue, 35.0);

        let short = dashboard
            .report_at(Period::Week, at("2026-04-20T00:00:00Z"))
            .await
            .unwrap();
        assert!(short.monthly.is_empty());
        assert_eq!(short.stats.total, 1);
    }

    #[tokio::test]
    async fn status_filter_narrows_rides() {
        let (_store, dashboard) = fixture().await;
        let report = dashboard
            .report_at(Period::Year, at("2026-04-20T00:00:00Z"))
            .await
            .unwrap();
        assert_eq!(report.filter_status(None).len(), 5);
        assert_eq!(report.filter_status(Some(RideStatus::Completed)).len(), 3);
        assert!(report.filter_status(Some(RideStatus::Refused)).is_empty());
    }
}
