//! In-process store with the same semantics as the hosted backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use jamal_core::destination::DestinationId;
use jamal_core::payment::PaymentId;
use jamal_core::schema::tables;
use jamal_core::{
    Destination, DestinationPatch, Driver, DriverId, DriverPatch, NewDestination, NewDriver,
    NewPayment, NewRideRequest, Notification, Payment, PaymentPatch, Rating, RideId, RidePatch,
    RideRequest, RideStatus,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{Backend, DriverFilter, RideFilter, SortOrder};
use crate::StoreError;

#[derive(Default)]
struct Tables {
    drivers: BTreeMap<DriverId, Driver>,
    rides: BTreeMap<RideId, RideRequest>,
    destinations: BTreeMap<DestinationId, Destination>,
    payments: BTreeMap<PaymentId, Payment>,
    /// Insertion order.
    notifications: Vec<Notification>,
    ratings: Vec<Rating>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let seq = self.sequences.entry(table).or_insert(0);
        *seq += 1;
        *seq
    }
}

/// Tables held in memory behind a [`tokio::sync::RwLock`].
///
/// Ids come from per-table sequences starting at 1 and are never reused,
/// matching `SERIAL` columns. Used by tests, `jamal simulate`, and as a
/// scratch backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ratings recorded so far, oldest first.
    pub async fn ratings(&self) -> Vec<Rating> {
        self.tables.read().await.ratings.clone()
    }
}

#[async_trait]
impl Backend for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.drivers
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn get_driver(&self, id: DriverId) -> Result<Driver, StoreError> {
        let t = self.tables.read().await;
        t.drivers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(tables::DRIVERS, id))
    }

    async fn find_driver_by_code(&self, code: &str) -> Result<Option<Driver>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.drivers.values().find(|d| d.code == code).cloned())
    }

    async fn insert_driver(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        let mut t = self.tables.write().await;
        if t.drivers.values().any(|d| d.code == driver.code) {
            return Err(StoreError::DuplicateCode(driver.code));
        }
        let id = t.next_id(tables::DRIVERS);
        let row = Driver::from_new(id, driver);
        t.drivers.insert(id, row.clone());
        debug!(id, "inserted driver");
        Ok(row)
    }

    async fn update_driver(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(code) = &patch.code
            && t.drivers.values().any(|d| d.id != id && &d.code == code)
        {
            return Err(StoreError::DuplicateCode(code.clone()));
        }
        let row = t
            .drivers
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(tables::DRIVERS, id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete_driver(&self, id: DriverId) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        t.drivers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(tables::DRIVERS, id))
    }

    async fn insert_ride(&self, ride: NewRideRequest) -> Result<RideRequest, StoreError> {
        let mut t = self.tables.write().await;
        let id = t.next_id(tables::RIDES);
        let row = RideRequest::from_new(id, ride);
        t.rides.insert(id, row.clone());
        debug!(id, "inserted ride request");
        Ok(row)
    }

    async fn get_ride(&self, id: RideId) -> Result<RideRequest, StoreError> {
        let t = self.tables.read().await;
        t.rides
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(tables::RIDES, id))
    }

    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<RideRequest>, StoreError> {
        let t = self.tables.read().await;
        let mut rides: Vec<RideRequest> = t
            .rides
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rides.sort_by_key(|r| r.timestamp);
        if filter.order == SortOrder::Descending {
            rides.reverse();
        }
        Ok(rides)
    }

    async fn update_ride(&self, id: RideId, patch: &RidePatch) -> Result<RideRequest, StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .rides
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(tables::RIDES, id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn update_ride_if(
        &self,
        id: RideId,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<RideRequest, StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .rides
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(tables::RIDES, id))?;
        if row.status != expected {
            return Err(StoreError::conflict(tables::RIDES, id, expected));
        }
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete_ride(&self, id: RideId) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        t.rides
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(tables::RIDES, id))
    }

    async fn list_destinations(&self, active_only: bool) -> Result<Vec<Destination>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Destination> = t
            .destinations
            .values()
            .filter(|d| !active_only || d.active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_destination(&self, id: DestinationId) -> Result<Destination, StoreError> {
        let t = self.tables.read().await;
        t.destinations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(tables::DESTINATIONS, id))
    }

    async fn insert_destination(
        &self,
        destination: NewDestination,
    ) -> Result<Destination, StoreError> {
        let mut t = self.tables.write().await;
        let id = t.next_id(tables::DESTINATIONS);
        let row = Destination::from_new(id, destination);
        t.destinations.insert(id, row.clone());
        Ok(row)
    }

    async fn update_destination(
        &self,
        id: DestinationId,
        patch: &DestinationPatch,
    ) -> Result<Destination, StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .destinations
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(tables::DESTINATIONS, id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn delete_destination(&self, id: DestinationId) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        t.destinations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(tables::DESTINATIONS, id))
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let mut t = self.tables.write().await;
        let id = t.next_id(tables::PAYMENTS);
        let row = Payment::from_new(id, payment);
        t.payments.insert(id, row.clone());
        Ok(row)
    }

    async fn list_payments(&self, driver_id: Option<DriverId>) -> Result<Vec<Payment>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Payment> = t
            .payments
            .values()
            .filter(|p| driver_id.is_none_or(|id| p.driver_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.period_end.cmp(&a.period_end).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn update_payment(
        &self,
        id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Payment, StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(tables::PAYMENTS, id))?;
        row.apply(patch);
        Ok(row.clone())
    }

    async fn insert_notification(
        &self,
        mut notification: Notification,
    ) -> Result<Notification, StoreError> {
        let mut t = self.tables.write().await;
        notification.created_at.get_or_insert_with(Utc::now);
        t.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Notification> = t.notifications.iter().rev().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::not_found(tables::NOTIFICATIONS, id))?;
        row.read = true;
        Ok(())
    }

    async fn insert_rating(&self, rating: Rating) -> Result<(), StoreError> {
        self.tables.write().await.ratings.push(rating);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamal_core::{ClientInfo, DriverStatus, PaymentStatus};

    fn new_driver(code: &str) -> NewDriver {
        NewDriver::new(code, format!("Driver {code}"), "11999990000", "Honda CG 160", "ABC-1234")
    }

    #[tokio::test]
    async fn driver_ids_are_sequential_and_codes_unique() {
        let store = MemoryStore::new();
        let a = store.insert_driver(new_driver("1234")).await.unwrap();
        let b = store.insert_driver(new_driver("5678")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));

        let dup = store.insert_driver(new_driver("1234")).await;
        assert!(matches!(dup, Err(StoreError::DuplicateCode(code)) if code == "1234"));

        let clash = DriverPatch {
            code: Some("1234".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_driver(b.id, &clash).await,
            Err(StoreError::DuplicateCode(_))
        ));
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let store = MemoryStore::new();
        let a = store.insert_driver(new_driver("1")).await.unwrap();
        store.delete_driver(a.id).await.unwrap();
        let b = store.insert_driver(new_driver("2")).await.unwrap();
        assert_eq!(b.id, 2);
        assert!(store.get_driver(a.id).await.unwrap_err().is_not_found());
        assert!(store.delete_driver(a.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn driver_filters() {
        let store = MemoryStore::new();
        let a = store.insert_driver(new_driver("1")).await.unwrap();
        store.insert_driver(new_driver("2")).await.unwrap();
        store
            .update_driver(
                a.id,
                &DriverPatch {
                    status: Some(DriverStatus::Online),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let online = store.list_drivers(&DriverFilter::available()).await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, a.id);
        assert_eq!(store.list_drivers(&DriverFilter::default()).await.unwrap().len(), 2);
        assert!(store.find_driver_by_code("2").await.unwrap().is_some());
        assert!(store.find_driver_by_code("9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rides_are_ordered_by_timestamp() {
        let store = MemoryStore::new();
        for ts in ["2026-03-01T12:05:00Z", "2026-03-01T12:00:00Z", "2026-03-01T12:10:00Z"] {
            let mut new = NewRideRequest::pending(ClientInfo::default(), "Centro");
            new.timestamp = ts.parse().unwrap();
            store.insert_ride(new).await.unwrap();
        }
        let asc = store.list_rides(&RideFilter::pending()).await.unwrap();
        let ids: Vec<_> = asc.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        store
            .update_ride(2, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();
        let desc = store
            .list_rides(&RideFilter {
                order: SortOrder::Descending,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(desc.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(store.list_rides(&RideFilter::pending()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conditional_ride_update_leaves_moved_rows_alone() {
        let store = MemoryStore::new();
        let ride = store
            .insert_ride(NewRideRequest::pending(ClientInfo::default(), "Centro"))
            .await
            .unwrap();
        store
            .update_ride(ride.id, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();
        let err = store
            .update_ride_if(ride.id, RideStatus::Pending, &RidePatch::status(RideStatus::Accepted))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("solicitacoes row {} is no longer pendente", ride.id));
        assert_eq!(store.get_ride(ride.id).await.unwrap().status, RideStatus::Cancelled);
        assert!(store
            .update_ride_if(42, RideStatus::Pending, &RidePatch::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn destinations_sorted_by_name() {
        let store = MemoryStore::new();
        store
            .insert_destination(NewDestination::new("Shopping", "Av. B"))
            .await
            .unwrap();
        let airport = store
            .insert_destination(NewDestination::new("Aeroporto", "Rod. A"))
            .await
            .unwrap();
        store
            .update_destination(
                airport.id,
                &DestinationPatch {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let all = store.list_destinations(false).await.unwrap();
        assert_eq!(all[0].name, "Aeroporto");
        let active = store.list_destinations(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Shopping");
    }

    #[tokio::test]
    async fn payments_newest_period_first() {
        let store = MemoryStore::new();
        for (driver_id, end) in [(1, "2026-01-31T23:59:59Z"), (2, "2026-02-28T23:59:59Z")] {
            store
                .insert_payment(NewPayment {
                    driver_id,
                    driver_name: "x".into(),
                    ride_count: 1,
                    gross: 10.0,
                    commission: 1.5,
                    net: 8.5,
                    period_start: "2026-01-01T00:00:00Z".parse().unwrap(),
                    period_end: end.parse().unwrap(),
                    status: PaymentStatus::Pending,
                })
                .await
                .unwrap();
        }
        let all = store.list_payments(None).await.unwrap();
        assert_eq!(all[0].driver_id, 2);
        assert_eq!(store.list_payments(Some(1)).await.unwrap().len(), 1);

        let paid = store
            .update_payment(
                1,
                &PaymentPatch {
                    status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn notifications_newest_first_and_mark_read() {
        let store = MemoryStore::new();
        let first = store
            .insert_notification(Notification::new("a", "first", None))
            .await
            .unwrap();
        store
            .insert_notification(Notification::new("b", "second", Some("1234".into())))
            .await
            .unwrap();
        let rows = store.list_notifications().await.unwrap();
        assert_eq!(rows[0].message, "second");
        assert!(rows.iter().all(|n| n.created_at.is_some()));

        store.mark_notification_read(&first.id).await.unwrap();
        let rows = store.list_notifications().await.unwrap();
        assert!(rows.iter().find(|n| n.id == first.id).unwrap().read);
        assert!(store.mark_notification_read("nope").await.unwrap_err().is_not_found());
    }
}
