//! Destinations offered to clients.

use jamal_core::destination::DestinationId;
use jamal_core::geo::geocode_address;
use jamal_core::{Destination, DestinationPatch, NewDestination};
use jamal_store::SharedBackend;
use tracing::info;

use crate::DispatchError;

#[derive(Clone)]
pub struct DestinationService {
    backend: SharedBackend,
}

impl DestinationService {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Every destination, ordered by name.
    pub async fn list(&self) -> Result<Vec<Destination>, DispatchError> {
        Ok(self.backend.list_destinations(false).await?)
    }

    /// What the client can pick from.
    pub async fn list_active(&self) -> Result<Vec<Destination>, DispatchError> {
        Ok(self.backend.list_destinations(true).await?)
    }

    /// Insert a destination, geocoding the address.
    pub async fn add(&self, name: &str, address: &str) -> Result<Destination, DispatchError> {
        let new = NewDestination::new(name.trim(), address.trim()).at(geocode_address(address));
        new.validate()?;
        let destination = self.backend.insert_destination(new).await?;
        info!(id = destination.id, name = %destination.name, "destination added");
        Ok(destination)
    }

    /// Rename or move a destination; coordinates follow a changed address.
    pub async fn update(
        &self,
        id: DestinationId,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<Destination, DispatchError> {
        let current = self.backend.get_destination(id).await?;
        let mut patch = DestinationPatch {
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            ..Default::default()
        };
        if let Some(address) = address.map(str::trim).filter(|a| !a.is_empty())
            && address != current.address
        {
            if let Some(p) = geocode_address(address) {
                patch.latitude = Some(p.latitude);
                patch.longitude = Some(p.longitude);
            }
            patch.address = Some(address.to_string());
        }
        Ok(self.backend.update_destination(id, &patch).await?)
    }

    pub async fn toggle_active(&self, id: DestinationId) -> Result<Destination, DispatchError> {
        let current = self.backend.get_destination(id).await?;
        let patch = DestinationPatch {
            active: Some(!current.active),
            ..Default::default()
        };
        Ok(self.backend.update_destination(id, &patch).await?)
    }

    pub async fn delete(&self, id: DestinationId) -> Result<(), DispatchError> {
        self.backend.delete_destination(id).await?;
        info!(id, "destination deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jamal_core::CoreError;
    use jamal_store::MemoryStore;

    fn service() -> DestinationService {
        DestinationService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn add_geocodes_and_lists_by_name() {
        let dest = service();
        let shop = dest.add("Shopping Ibirapuera", "Av. Ibirapuera, 3103").await.unwrap();
        dest.add("Aeroporto", "Rod. Hélio Smidt").await.unwrap();
        assert!(shop.position().is_some());
        let names: Vec<_> = dest.list().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Aeroporto", "Shopping Ibirapuera"]);
        assert!(matches!(
            dest.add("x", "  ").await,
            Err(DispatchError::Core(CoreError::MissingField("endereco")))
        ));
    }

    #[tokio::test]
    async fn address_change_moves_coordinates() {
        let dest = service();
        let d = dest.add("Centro", "Praça da Sé").await.unwrap();

        let renamed = dest.update(d.id, Some("Sé"), Some("Praça da Sé")).await.unwrap();
        assert_eq!(renamed.name, "Sé");
        assert_eq!(renamed.position(), d.position());

        let moved = dest.update(d.id, None, Some("Av. Paulista, 1000")).await.unwrap();
        assert_eq!(moved.address, "Av. Paulista, 1000");
        assert_ne!(moved.position(), d.position());
    }

    #[tokio::test]
    async fn toggled_destination_leaves_active_list() {
        let dest = service();
        let d = dest.add("Centro", "Praça da Sé").await.unwrap();
        assert_eq!(dest.list_active().await.unwrap().len(), 1);
        assert!(!dest.toggle_active(d.id).await.unwrap().active);
        assert!(dest.list_active().await.unwrap().is_empty());
        dest.delete(d.id).await.unwrap();
        assert!(dest.delete(d.id).await.unwrap_err().is_not_found());
    }
}
