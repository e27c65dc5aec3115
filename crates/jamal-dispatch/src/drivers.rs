//! Fleet management and driver availability.

use jamal_core::driver::default_fleet;
use jamal_core::{Coordinates, Driver, DriverId, DriverPatch, DriverStatus, NewDriver};
use jamal_store::{DriverFilter, SharedBackend};
use jamal_sync::{EventBus, RideEvent};
use tracing::{info, warn};

use crate::DispatchError;

#[derive(Clone)]
pub struct DriverService {
    backend: SharedBackend,
    events: EventBus,
}

impl DriverService {
    pub fn new(backend: SharedBackend, events: EventBus) -> Self {
        Self { backend, events }
    }

    /// Insert the demo fleet into an empty `drivers` table. Returns how many
    /// rows were added.
    pub async fn seed_defaults(&self) -> Result<usize, DispatchError> {
        if !self.backend.list_drivers(&DriverFilter::default()).await?.is_empty() {
            return Ok(0);
        }
        let mut added = 0;
        for driver in default_fleet() {
            match self.backend.insert_driver(driver).await {
                Ok(_) => added += 1,
                Err(e) => warn!(error = %e, "could not seed driver"),
            }
        }
        info!(added, "seeded default drivers");
        Ok(added)
    }

    /// Every driver, ordered by id.
    pub async fn list(&self) -> Result<Vec<Driver>, DispatchError> {
        Ok(self.backend.list_drivers(&DriverFilter::default()).await?)
    }

    pub async fn get(&self, id: DriverId) -> Result<Driver, DispatchError> {
        Ok(self.backend.get_driver(id).await?)
    }

    /// Login lookup: only active drivers can sign in.
    pub async fn by_code(&self, code: &str) -> Result<Driver, DispatchError> {
        let code = code.trim();
        match self.backend.find_driver_by_code(code).await? {
            Some(driver) if driver.active => Ok(driver),
            _ => Err(DispatchError::UnknownDriverCode(code.to_string())),
        }
    }

    pub async fn active(&self) -> Result<Vec<Driver>, DispatchError> {
        Ok(self.backend.list_drivers(&DriverFilter::active()).await?)
    }

    pub async fn online_count(&self) -> Result<usize, DispatchError> {
        Ok(self.backend.list_drivers(&DriverFilter::available()).await?.len())
    }

    /// Lowest unused access code in `0000`..=`9999`.
    pub async fn next_free_code(&self) -> Result<String, DispatchError> {
        let drivers = self.list().await?;
        lowest_free_code(drivers.iter().map(|d| d.code.as_str()))
            .ok_or(DispatchError::NoFreeDriverCode)
    }

    /// Register a driver. Missing fields and duplicate codes are rejected.
    pub async fn add(&self, driver: NewDriver) -> Result<Driver, DispatchError> {
        driver.validate()?;
        let driver = self.backend.insert_driver(driver).await?;
        info!(driver_id = driver.id, code = %driver.code, "driver added");
        Ok(driver)
    }

    pub async fn update(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, DispatchError> {
        Ok(self.backend.update_driver(id, patch).await?)
    }

    pub async fn delete(&self, id: DriverId) -> Result<(), DispatchError> {
        self.backend.delete_driver(id).await?;
        info!(driver_id = id, "driver deleted");
        Ok(())
    }

    pub async fn set_online(&self, id: DriverId, online: bool) -> Result<Driver, DispatchError> {
        let status = if online {
            DriverStatus::Online
        } else {
            DriverStatus::Offline
        };
        let patch = DriverPatch {
            status: Some(status),
            ..Default::default()
        };
        let driver = self.backend.update_driver(id, &patch).await?;
        info!(driver_id = id, %status, "driver status changed");
        self.events
            .publish(RideEvent::DriverStatusChanged { driver_id: id, status });
        Ok(driver)
    }

    /// Store the driver's current position.
    pub async fn update_location(
        &self,
        id: DriverId,
        position: Coordinates,
    ) -> Result<Driver, DispatchError> {
        let patch = DriverPatch {
            latitude: Some(position.latitude),
            longitude: Some(position.longitude),
            ..Default::default()
        };
        Ok(self.backend.update_driver(id, &patch).await?)
    }

    /// Flip the admin `ativo` flag.
    pub async fn toggle_active(&self, id: DriverId) -> Result<Driver, DispatchError> {
        let driver = self.backend.get_driver(id).await?;
        let patch = DriverPatch {
            active: Some(!driver.active),
            ..Default::default()
        };
        Ok(self.backend.update_driver(id, &patch).await?)
    }
}

/// Codes that are not four digits never block a slot.
fn lowest_free_code<'a>(codes: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut taken = vec![false; 10_000];
    for code in codes {
        let code = code.trim();
        if code.len() == 4
            && code.bytes().all(|b| b.is_ascii_digit())
            && let Ok(n) = code.parse::<usize>()
        {
            taken[n] = true;
        }
    }
    taken.iter().position(|t| !t).map(|n| format!("{n:04}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jamal_store::{MemoryStore, StoreError};

    fn service() -> DriverService {
        DriverService::new(Arc::new(MemoryStore::new()), EventBus::default())
    }

    #[tokio::test]
    async fn seed_only_fills_empty_table() {
        let drivers = service();
        assert_eq!(drivers.seed_defaults().await.unwrap(), 3);
        assert_eq!(drivers.seed_defaults().await.unwrap(), 0);
        assert_eq!(drivers.list().await.unwrap().len(), 3);
        assert_eq!(drivers.online_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn add_rejects_duplicates_and_blank_fields() {
        let drivers = service();
        drivers.seed_defaults().await.unwrap();
        let dup = NewDriver::new("1234", "Outro", "11", "CG", "AAA-0000");
        assert!(matches!(
            drivers.add(dup).await,
            Err(DispatchError::Store(StoreError::DuplicateCode(_)))
        ));
        let blank = NewDriver::new("4321", "Outro", "11", "CG", "");
        assert!(matches!(drivers.add(blank).await, Err(DispatchError::Core(_))));

        let fresh = drivers
            .add(NewDriver::new("4321", "Joana", "11", "Biz 125", "JJJ-4321"))
            .await
            .unwrap();
        assert_eq!(fresh.rating, 5.0);
        assert_eq!(fresh.rides, 0);
        assert_eq!(fresh.status, DriverStatus::Offline);
        assert!(fresh.active);
    }

    #[test]
    fn free_code_fills_gaps_with_padding() {
        assert_eq!(lowest_free_code([]), Some("0000".into()));
        assert_eq!(
            lowest_free_code(["0000", "0001", "0003", "abcd", "12"]),
            Some("0002".into())
        );
        assert_eq!(lowest_free_code(["0000", "+001"]), Some("0001".into()));
        let all: Vec<String> = (0..10_000).map(|n| format!("{n:04}")).collect();
        assert_eq!(lowest_free_code(all.iter().map(String::as_str)), None);
    }

    #[tokio::test]
    async fn next_free_code_skips_fleet_codes() {
        let drivers = service();
        assert_eq!(drivers.next_free_code().await.unwrap(), "0000");
        drivers.seed_defaults().await.unwrap();
        drivers
            .add(NewDriver::new("0000", "Joana", "11", "Biz 125", "JJJ-0000"))
            .await
            .unwrap();
        assert_eq!(drivers.next_free_code().await.unwrap(), "0001");
    }

    #[tokio::test]
    async fn login_requires_active_driver() {
        let drivers = service();
        drivers.seed_defaults().await.unwrap();
        let ana = drivers.by_code(" 5678 ").await.unwrap();
        drivers.toggle_active(ana.id).await.unwrap();
        assert!(matches!(
            drivers.by_code("5678").await,
            Err(DispatchError::UnknownDriverCode(_))
        ));
        assert!(drivers.by_code("0000").await.is_err());
        assert_eq!(drivers.active().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn going_online_publishes_status() {
        let drivers = service();
        drivers.seed_defaults().await.unwrap();
        let mut rx = drivers.events.subscribe();
        let ana = drivers.by_code("5678").await.unwrap();
        let ana = drivers.set_online(ana.id, true).await.unwrap();
        assert!(ana.is_available());
        assert_eq!(
            rx.recv().await.unwrap(),
            RideEvent::DriverStatusChanged {
                driver_id: ana.id,
                status: DriverStatus::Online
            }
        );
        let moved = drivers
            .update_location(ana.id, Coordinates::new(-23.5, -46.6))
            .await
            .unwrap();
        assert_eq!(moved.position(), Some(Coordinates::new(-23.5, -46.6)));
    }
}
