//! Supabase PostgREST client implementing [`Backend`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use jamal_core::destination::DestinationId;
use jamal_core::payment::PaymentId;
use jamal_core::schema::tables;
use jamal_core::{
    Destination, DestinationPatch, Driver, DriverId, DriverPatch, NewDestination, NewDriver,
    NewPayment, NewRideRequest, Notification, Payment, PaymentPatch, Rating, RideId, RidePatch,
    RideRequest, RideStatus,
};
use jamal_store::{Backend, DriverFilter, RideFilter, SortOrder, StoreError};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::SyncError;

type Query = Vec<(&'static str, String)>;

fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn driver_query(filter: &DriverFilter) -> Query {
    let mut q: Query = vec![("select", "*".into())];
    if let Some(active) = filter.active {
        q.push(("ativo", eq(active)));
    }
    if let Some(status) = filter.status {
        q.push(("status", eq(status)));
    }
    q.push(("order", "id.asc".into()));
    q
}

fn ride_query(filter: &RideFilter) -> Query {
    let mut q: Query = vec![("select", "*".into())];
    if let Some(status) = filter.status {
        q.push(("status", eq(status)));
    }
    if let Some(driver_id) = filter.driver_id {
        q.push(("motorista->>id", eq(driver_id)));
    }
    if let Some(since) = filter.since {
        q.push(("timestamp", format!("gte.{}", stamp(since))));
    }
    if let Some(until) = filter.until {
        q.push(("timestamp", format!("lte.{}", stamp(until))));
    }
    let order = match filter.order {
        SortOrder::Ascending => "timestamp.asc",
        SortOrder::Descending => "timestamp.desc",
    };
    q.push(("order", order.into()));
    q
}

fn by_id(id: impl ToString) -> Query {
    vec![("id", eq(id))]
}

/// PostgREST only patches rows still matching the status filter.
fn by_id_and_status(id: RideId, status: RideStatus) -> Query {
    vec![("id", eq(id)), ("status", eq(status))]
}

fn first<T>(rows: Vec<T>, table: &'static str, id: impl ToString) -> Result<T, StoreError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::not_found(table, id))
}

/// Client for the hosted backend's REST surface (`/rest/v1/<table>`).
///
/// Every request carries the anon key as both `apikey` and bearer token.
/// Writes ask for `return=representation` so the stored row comes back.
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    /// `base_url` should be like `https://xyz.supabase.co`.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str, query: &Query) -> RequestBuilder {
        let url = self.table_url(table);
        debug!(%method, url = %url, "supabase request");
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .query(query)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, SyncError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &'static str,
        query: &Query,
    ) -> Result<Vec<T>, SyncError> {
        let resp = self.send(self.request(Method::GET, table, query)).await?;
        Ok(resp.json().await?)
    }

    async fn write<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        table: &'static str,
        query: &Query,
        body: &B,
    ) -> Result<Vec<T>, SyncError> {
        let req = self
            .request(method, table, query)
            .header("Prefer", "return=representation")
            .json(body);
        let resp = self.send(req).await?;
        Ok(resp.json().await?)
    }

    async fn insert<T: DeserializeOwned, B: Serialize>(
        &self,
        table: &'static str,
        body: &B,
    ) -> Result<T, StoreError> {
        let rows: Vec<T> = self.write(Method::POST, table, &Vec::new(), body).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Other(format!("insert into {table} returned no row")))?;
        info!(table, "inserted row");
        Ok(row)
    }

    async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        table: &'static str,
        id: i64,
        body: &B,
    ) -> Result<T, StoreError> {
        let rows = self.write(Method::PATCH, table, &by_id(id), body).await?;
        first(rows, table, id)
    }

    async fn delete(
        &self,
        table: &'static str,
        query: Query,
        id: String,
    ) -> Result<(), StoreError> {
        let req = self
            .request(Method::DELETE, table, &query)
            .header("Prefer", "return=representation");
        let resp = self.send(req).await?;
        let rows: Vec<serde_json::Value> = resp.json().await.map_err(SyncError::from)?;
        if rows.is_empty() {
            return Err(StoreError::not_found(table, id));
        }
        info!(table, id = %id, "deleted row");
        Ok(())
    }
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn ping(&self) -> Result<(), StoreError> {
        let query = vec![("select", "id".into()), ("limit", "1".into())];
        match self.select::<serde_json::Value>(tables::DRIVERS, &query).await {
            Ok(_) => Ok(()),
            Err(SyncError::Server { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(StoreError::MissingTable(tables::DRIVERS.into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, StoreError> {
        Ok(self.select(tables::DRIVERS, &driver_query(filter)).await?)
    }

    async fn get_driver(&self, id: DriverId) -> Result<Driver, StoreError> {
        let rows = self.select(tables::DRIVERS, &by_id(id)).await?;
        first(rows, tables::DRIVERS, id)
    }

    async fn find_driver_by_code(&self, code: &str) -> Result<Option<Driver>, StoreError> {
        let rows: Vec<Driver> = self
            .select(tables::DRIVERS, &vec![("codigo", eq(code)), ("limit", "1".into())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_driver(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        if self.find_driver_by_code(&driver.code).await?.is_some() {
            return Err(StoreError::DuplicateCode(driver.code));
        }
        match self.write(Method::POST, tables::DRIVERS, &Vec::new(), &driver).await {
            Ok(rows) => first(rows, tables::DRIVERS, &driver.code),
            // Unique violation from a concurrent insert.
            Err(SyncError::Server { status: 409, .. }) => {
                Err(StoreError::DuplicateCode(driver.code))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_driver(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, StoreError> {
        if let Some(code) = &patch.code
            && let Some(other) = self.find_driver_by_code(code).await?
            && other.id != id
        {
            return Err(StoreError::DuplicateCode(code.clone()));
        }
        self.patch(tables::DRIVERS, id, patch).await
    }

    async fn delete_driver(&self, id: DriverId) -> Result<(), StoreError> {
        self.delete(tables::DRIVERS, by_id(id), id.to_string()).await
    }

    async fn insert_ride(&self, ride: NewRideRequest) -> Result<RideRequest, StoreError> {
        self.insert(tables::RIDES, &ride).await
    }

    async fn get_ride(&self, id: RideId) -> Result<RideRequest, StoreError> {
        let rows = self.select(tables::RIDES, &by_id(id)).await?;
        first(rows, tables::RIDES, id)
    }

    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<RideRequest>, StoreError> {
        Ok(self.select(tables::RIDES, &ride_query(filter)).await?)
    }

    async fn update_ride(&self, id: RideId, patch: &RidePatch) -> Result<RideRequest, StoreError> {
        self.patch(tables::RIDES, id, patch).await
    }

    async fn update_ride_if(
        &self,
        id: RideId,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<RideRequest, StoreError> {
        let query = by_id_and_status(id, expected);
        let rows: Vec<RideRequest> = self.write(Method::PATCH, tables::RIDES, &query, patch).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(row),
            None => {
                // Nothing matched: tell a missing row from one that moved on.
                self.get_ride(id).await?;
                Err(StoreError::conflict(tables::RIDES, id, expected))
            }
        }
    }

    async fn delete_ride(&self, id: RideId) -> Result<(), StoreError> {
        self.delete(tables::RIDES, by_id(id), id.to_string()).await
    }

    async fn list_destinations(&self, active_only: bool) -> Result<Vec<Destination>, StoreError> {
        let mut q: Query = vec![("select", "*".into())];
        if active_only {
            q.push(("ativo", eq(true)));
        }
        q.push(("order", "nome.asc".into()));
        Ok(self.select(tables::DESTINATIONS, &q).await?)
    }

    async fn get_destination(&self, id: DestinationId) -> Result<Destination, StoreError> {
        let rows = self.select(tables::DESTINATIONS, &by_id(id)).await?;
        first(rows, tables::DESTINATIONS, id)
    }

    async fn insert_destination(
        &self,
        destination: NewDestination,
    ) -> Result<Destination, StoreError> {
        self.insert(tables::DESTINATIONS, &destination).await
    }

    async fn update_destination(
        &self,
        id: DestinationId,
        patch: &DestinationPatch,
    ) -> Result<Destination, StoreError> {
        self.patch(tables::DESTINATIONS, id, patch).await
    }

    async fn delete_destination(&self, id: DestinationId) -> Result<(), StoreError> {
        self.delete(tables::DESTINATIONS, by_id(id), id.to_string()).await
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        self.insert(tables::PAYMENTS, &payment).await
    }

    async fn list_payments(&self, driver_id: Option<DriverId>) -> Result<Vec<Payment>, StoreError> {
        let mut q: Query = vec![("select", "*".into())];
        if let Some(id) = driver_id {
            q.push(("motorista_id", eq(id)));
        }
        q.push(("order", "data_fim.desc,id.desc".into()));
        Ok(self.select(tables::PAYMENTS, &q).await?)
    }

    async fn update_payment(
        &self,
        id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Payment, StoreError> {
        self.patch(tables::PAYMENTS, id, patch).await
    }

    async fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, StoreError> {
        self.insert(tables::NOTIFICATIONS, &notification).await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let q: Query = vec![("select", "*".into()), ("order", "created_at.desc".into())];
        Ok(self.select(tables::NOTIFICATIONS, &q).await?)
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError> {
        let body = serde_json::json!({ "lida": true });
        let rows: Vec<serde_json::Value> = self
            .write(Method::PATCH, tables::NOTIFICATIONS, &by_id(id), &body)
            .await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(tables::NOTIFICATIONS, id));
        }
        Ok(())
    }

    async fn insert_rating(&self, rating: Rating) -> Result<(), StoreError> {
        let req = self
            .request(Method::POST, tables::RATINGS, &Vec::new())
            .header("Prefer", "return=minimal")
            .json(&rating);
        self.send(req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamal_core::DriverStatus;

    #[test]
    fn client_trims_trailing_slash() {
        let client = SupabaseClient::new("https://abc.supabase.co/", "key");
        assert_eq!(client.base_url, "https://abc.supabase.co");
        assert_eq!(
            client.table_url(tables::RIDES),
            "https://abc.supabase.co/rest/v1/solicitacoes"
        );
    }

    #[test]
    fn conditional_patch_filters_on_status() {
        assert_eq!(
            by_id_and_status(7, RideStatus::Pending),
            vec![("id", "eq.7".to_string()), ("status", "eq.pendente".to_string())]
        );
    }

    #[test]
    fn available_driver_query() {
        let q = driver_query(&DriverFilter::available());
        assert!(q.contains(&("ativo", "eq.true".to_string())));
        assert!(q.contains(&("status", "eq.online".to_string())));
        assert_eq!(q.last(), Some(&("order", "id.asc".to_string())));
        assert_eq!(driver_query(&DriverFilter::default()).len(), 2);
        assert_eq!(DriverStatus::Offline.to_string(), "offline");
    }

    #[test]
    fn ride_query_uses_json_path_and_range() {
        let filter = RideFilter {
            status: Some(RideStatus::Completed),
            driver_id: Some(3),
            since: Some("2026-02-01T00:00:00Z".parse().unwrap()),
            until: Some("2026-02-28T23:59:59Z".parse().unwrap()),
            order: SortOrder::Descending,
        };
        let q = ride_query(&filter);
        assert!(q.contains(&("status", "eq.finalizada".to_string())));
        assert!(q.contains(&("motorista->>id", "eq.3".to_string())));
        assert!(q.contains(&("timestamp", "gte.2026-02-01T00:00:00.000Z".to_string())));
        assert!(q.contains(&("timestamp", "lte.2026-02-28T23:59:59.000Z".to_string())));
        assert_eq!(q.last(), Some(&("order", "timestamp.desc".to_string())));
    }

    #[test]
    fn server_errors_become_store_errors() {
        let err: StoreError = SyncError::Server {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Other(msg) if msg.contains("500")));
    }
}
