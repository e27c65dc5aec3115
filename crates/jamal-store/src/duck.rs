//! DuckDB storage for running without the hosted backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{Connection, params};
use jamal_core::destination::DestinationId;
use jamal_core::payment::PaymentId;
use jamal_core::schema::tables;
use jamal_core::{
    Destination, DestinationPatch, Driver, DriverId, DriverPatch, NewDestination, NewDriver,
    NewPayment, NewRideRequest, Notification, Payment, PaymentPatch, Rating, RideId, RidePatch,
    RideRequest, RideStatus,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::StoreError;
use crate::backend::{Backend, DriverFilter, RideFilter, SortOrder};

/// Each table keeps the full row as a JSON `doc` plus the handful of
/// columns that queries filter or sort on. Timestamps are fixed-width
/// RFC 3339 text so they sort lexically.
const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS drivers_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS solicitacoes_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS destinos_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS pagamentos_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS avaliacoes_id_seq START 1;

CREATE TABLE IF NOT EXISTS drivers (id BIGINT NOT NULL, codigo VARCHAR NOT NULL, doc VARCHAR NOT NULL);
CREATE TABLE IF NOT EXISTS solicitacoes (id BIGINT NOT NULL, status VARCHAR NOT NULL, ts VARCHAR NOT NULL, doc VARCHAR NOT NULL);
CREATE TABLE IF NOT EXISTS destinos (id BIGINT NOT NULL, nome VARCHAR NOT NULL, doc VARCHAR NOT NULL);
CREATE TABLE IF NOT EXISTS pagamentos (id BIGINT NOT NULL, motorista_id BIGINT NOT NULL, data_fim VARCHAR NOT NULL, doc VARCHAR NOT NULL);
CREATE TABLE IF NOT EXISTS notifications (id VARCHAR NOT NULL, created_at VARCHAR NOT NULL, doc VARCHAR NOT NULL);
CREATE TABLE IF NOT EXISTS avaliacoes (id BIGINT NOT NULL, motorista_id BIGINT NOT NULL, doc VARCHAR NOT NULL);
";

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode<T: Serialize>(row: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(row)?)
}

/// DuckDB-backed [`Backend`].
///
/// Use [`open`](Self::open) for an ephemeral in-memory database and
/// [`open_persistent`](Self::open_persistent) for a file that survives
/// restarts. The schema is created on open if missing.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened local database");
        Ok(store)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        if !tables::ALL.contains(&table) {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        let conn = self.conn()?;
        let n: i64 = conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?;
        Ok(n as usize)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("duckdb connection lock poisoned".into()))
    }
}

fn next_id(conn: &Connection, table: &str) -> Result<i64, StoreError> {
    let id = conn.query_row(&format!("SELECT nextval('{table}_id_seq')"), [], |r| r.get(0))?;
    Ok(id)
}

fn get_doc<T: DeserializeOwned>(
    conn: &Connection,
    table: &'static str,
    id: i64,
) -> Result<T, StoreError> {
    let sql = format!("SELECT doc FROM {table} WHERE id = ?");
    match conn.query_row(&sql, params![id], |r| r.get::<_, String>(0)) {
        Ok(doc) => Ok(serde_json::from_str(&doc)?),
        Err(duckdb::Error::QueryReturnedNoRows) => Err(StoreError::not_found(table, id)),
        Err(e) => Err(e.into()),
    }
}

fn docs<T: DeserializeOwned, P: duckdb::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map(params, |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    raw.iter()
        .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
        .collect()
}

fn delete_row(conn: &Connection, table: &'static str, id: i64) -> Result<(), StoreError> {
    let n = conn.execute(&format!("DELETE FROM {table} WHERE id = ?"), params![id])?;
    if n == 0 {
        return Err(StoreError::not_found(table, id));
    }
    Ok(())
}

fn code_taken(conn: &Connection, code: &str, except: Option<DriverId>) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT count(*) FROM drivers WHERE codigo = ? AND id <> ?",
        params![code, except.unwrap_or(-1)],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

#[async_trait]
impl Backend for DuckStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.count(tables::DRIVERS).map(|_| ())
    }

    async fn list_drivers(&self, filter: &DriverFilter) -> Result<Vec<Driver>, StoreError> {
        let conn = self.conn()?;
        let rows: Vec<Driver> = docs(&conn, "SELECT doc FROM drivers ORDER BY id", [])?;
        Ok(rows.into_iter().filter(|d| filter.matches(d)).collect())
    }

    async fn get_driver(&self, id: DriverId) -> Result<Driver, StoreError> {
        get_doc(&*self.conn()?, tables::DRIVERS, id)
    }

    async fn find_driver_by_code(&self, code: &str) -> Result<Option<Driver>, StoreError> {
        let conn = self.conn()?;
        let mut rows: Vec<Driver> = docs(
            &conn,
            "SELECT doc FROM drivers WHERE codigo = ? ORDER BY id LIMIT 1",
            params![code],
        )?;
        Ok(rows.pop())
    }

    async fn insert_driver(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        let conn = self.conn()?;
        if code_taken(&conn, &driver.code, None)? {
            return Err(StoreError::DuplicateCode(driver.code));
        }
        let id = next_id(&conn, tables::DRIVERS)?;
        let row = Driver::from_new(id, driver);
        conn.execute(
            "INSERT INTO drivers (id, codigo, doc) VALUES (?, ?, ?)",
            params![id, row.code, encode(&row)?],
        )?;
        debug!(id, "inserted driver");
        Ok(row)
    }

    async fn update_driver(&self, id: DriverId, patch: &DriverPatch) -> Result<Driver, StoreError> {
        let conn = self.conn()?;
        if let Some(code) = &patch.code
            && code_taken(&conn, code, Some(id))?
        {
            return Err(StoreError::DuplicateCode(code.clone()));
        }
        let mut row: Driver = get_doc(&conn, tables::DRIVERS, id)?;
        row.apply(patch);
        conn.execute(
            "UPDATE drivers SET codigo = ?, doc = ? WHERE id = ?",
            params![row.code, encode(&row)?, id],
        )?;
        Ok(row)
    }

    async fn delete_driver(&self, id: DriverId) -> Result<(), StoreError> {
        delete_row(&*self.conn()?, tables::DRIVERS, id)
    }

    async fn insert_ride(&self, ride: NewRideRequest) -> Result<RideRequest, StoreError> {
        let conn = self.conn()?;
        let id = next_id(&conn, tables::RIDES)?;
        let row = RideRequest::from_new(id, ride);
        conn.execute(
            "INSERT INTO solicitacoes (id, status, ts, doc) VALUES (?, ?, ?, ?)",
            params![id, row.status.as_str(), ts(row.timestamp), encode(&row)?],
        )?;
        debug!(id, "inserted ride request");
        Ok(row)
    }

    async fn get_ride(&self, id: RideId) -> Result<RideRequest, StoreError> {
        get_doc(&*self.conn()?, tables::RIDES, id)
    }

    async fn list_rides(&self, filter: &RideFilter) -> Result<Vec<RideRequest>, StoreError> {
        let conn = self.conn()?;
        let mut rows: Vec<RideRequest> = match filter.status {
            Some(status) => docs(
                &conn,
                "SELECT doc FROM solicitacoes WHERE status = ? ORDER BY ts, id",
                params![status.as_str()],
            )?,
            None => docs(&conn, "SELECT doc FROM solicitacoes ORDER BY ts, id", [])?,
        };
        rows.retain(|r| filter.matches(r));
        if filter.order == SortOrder::Descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn update_ride(&self, id: RideId, patch: &RidePatch) -> Result<RideRequest, StoreError> {
        let conn = self.conn()?;
        let mut row: RideRequest = get_doc(&conn, tables::RIDES, id)?;
        row.apply(patch);
        conn.execute(
            "UPDATE solicitacoes SET status = ?, doc = ? WHERE id = ?",
            params![row.status.as_str(), encode(&row)?, id],
        )?;
        Ok(row)
    }

    async fn update_ride_if(
        &self,
        id: RideId,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<RideRequest, StoreError> {
        let conn = self.conn()?;
        let mut row: RideRequest = get_doc(&conn, tables::RIDES, id)?;
        if row.status != expected {
            return Err(StoreError::conflict(tables::RIDES, id, expected));
        }
        row.apply(patch);
        conn.execute(
            "UPDATE solicitacoes SET status = ?, doc = ? WHERE id = ? AND status = ?",
            params![row.status.as_str(), encode(&row)?, id, expected.as_str()],
        )?;
        Ok(row)
    }

    async fn delete_ride(&self, id: RideId) -> Result<(), StoreError> {
        delete_row(&*self.conn()?, tables::RIDES, id)
    }

    async fn list_destinations(&self, active_only: bool) -> Result<Vec<Destination>, StoreError> {
        let conn = self.conn()?;
        let rows: Vec<Destination> = docs(&conn, "SELECT doc FROM destinos ORDER BY nome, id", [])?;
        Ok(rows.into_iter().filter(|d| !active_only || d.active).collect())
    }

    async fn get_destination(&self, id: DestinationId) -> Result<Destination, StoreError> {
        get_doc(&*self.conn()?, tables::DESTINATIONS, id)
    }

    async fn insert_destination(
        &self,
        destination: NewDestination,
    ) -> Result<Destination, StoreError> {
        let conn = self.conn()?;
        let id = next_id(&conn, tables::DESTINATIONS)?;
        let row = Destination::from_new(id, destination);
        conn.execute(
            "INSERT INTO destinos (id, nome, doc) VALUES (?, ?, ?)",
            params![id, row.name, encode(&row)?],
        )?;
        Ok(row)
    }

    async fn update_destination(
        &self,
        id: DestinationId,
        patch: &DestinationPatch,
    ) -> Result<Destination, StoreError> {
        let conn = self.conn()?;
        let mut row: Destination = get_doc(&conn, tables::DESTINATIONS, id)?;
        row.apply(patch);
        conn.execute(
            "UPDATE destinos SET nome = ?, doc = ? WHERE id = ?",
            params![row.name, encode(&row)?, id],
        )?;
        Ok(row)
    }

    async fn delete_destination(&self, id: DestinationId) -> Result<(), StoreError> {
        delete_row(&*self.conn()?, tables::DESTINATIONS, id)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let conn = self.conn()?;
        let id = next_id(&conn, tables::PAYMENTS)?;
        let row = Payment::from_new(id, payment);
        conn.execute(
            "INSERT INTO pagamentos (id, motorista_id, data_fim, doc) VALUES (?, ?, ?, ?)",
            params![id, row.driver_id, ts(row.period_end), encode(&row)?],
        )?;
        Ok(row)
    }

    async fn list_payments(&self, driver_id: Option<DriverId>) -> Result<Vec<Payment>, StoreError> {
        let conn = self.conn()?;
        match driver_id {
            Some(driver_id) => docs(
                &conn,
                "SELECT doc FROM pagamentos WHERE motorista_id = ? ORDER BY data_fim DESC, id DESC",
                params![driver_id],
            ),
            None => docs(
                &conn,
                "SELECT doc FROM pagamentos ORDER BY data_fim DESC, id DESC",
                [],
            ),
        }
    }

    async fn update_payment(
        &self,
        id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Payment, StoreError> {
        let conn = self.conn()?;
        let mut row: Payment = get_doc(&conn, tables::PAYMENTS, id)?;
        row.apply(patch);
        conn.execute(
            "UPDATE pagamentos SET doc = ? WHERE id = ?",
            params![encode(&row)?, id],
        )?;
        Ok(row)
    }

    async fn insert_notification(
        &self,
        mut notification: Notification,
    ) -> Result<Notification, StoreError> {
        let conn = self.conn()?;
        let created = *notification.created_at.get_or_insert_with(Utc::now);
        conn.execute(
            "INSERT INTO notifications (id, created_at, doc) VALUES (?, ?, ?)",
            params![notification.id, ts(created), encode(&notification)?],
        )?;
        Ok(notification)
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let conn = self.conn()?;
        docs(
            &conn,
            "SELECT doc FROM notifications ORDER BY created_at DESC, rowid DESC",
            [],
        )
    }

    async fn mark_notification_read(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let doc = match conn.query_row(
            "SELECT doc FROM notifications WHERE id = ?",
            params![id],
            |r| r.get::<_, String>(0),
        ) {
            Ok(doc) => doc,
            Err(duckdb::Error::QueryReturnedNoRows) => {
                return Err(StoreError::not_found(tables::NOTIFICATIONS, id));
            }
            Err(e) => return Err(e.into()),
        };
        let mut row: Notification = serde_json::from_str(&doc)?;
        row.read = true;
        conn.execute(
            "UPDATE notifications SET doc = ? WHERE id = ?",
            params![encode(&row)?, id],
        )?;
        Ok(())
    }

    async fn insert_rating(&self, rating: Rating) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let id = next_id(&conn, tables::RATINGS)?;
        conn.execute(
            "INSERT INTO avaliacoes (id, motorista_id, doc) VALUES (?, ?, ?)",
            params![id, rating.driver_id, encode(&rating)?],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamal_core::{ClientInfo, DriverStatus};

    #[test]
    fn open_in_memory_creates_schema() {
        let store = DuckStore::open().unwrap();
        for table in tables::ALL {
            assert_eq!(store.count(table).unwrap(), 0, "{table}");
        }
        assert!(matches!(
            store.count("legislation"),
            Err(StoreError::MissingTable(_))
        ));
    }

    #[tokio::test]
    async fn drivers_round_trip_through_doc_column() {
        let store = DuckStore::open().unwrap();
        let d = store
            .insert_driver(NewDriver::new("1234", "Carlos", "11", "CG", "ABC-1234"))
            .await
            .unwrap();
        assert_eq!(d.id, 1);
        assert!(matches!(
            store
                .insert_driver(NewDriver::new("1234", "Outro", "11", "CG", "X"))
                .await,
            Err(StoreError::DuplicateCode(_))
        ));

        let patch = DriverPatch {
            status: Some(DriverStatus::Online),
            ..Default::default()
        };
        store.update_driver(d.id, &patch).await.unwrap();
        let online = store.list_drivers(&DriverFilter::available()).await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(
            store.find_driver_by_code("1234").await.unwrap().unwrap().status,
            DriverStatus::Online
        );

        store.delete_driver(d.id).await.unwrap();
        assert!(store.get_driver(d.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn ride_status_column_tracks_updates() {
        let store = DuckStore::open().unwrap();
        let ride = store
            .insert_ride(NewRideRequest::pending(ClientInfo::default(), "Centro"))
            .await
            .unwrap();
        assert_eq!(store.list_rides(&RideFilter::pending()).await.unwrap().len(), 1);

        store
            .update_ride(ride.id, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();
        assert!(store.list_rides(&RideFilter::pending()).await.unwrap().is_empty());
        assert_eq!(
            store.get_ride(ride.id).await.unwrap().status,
            RideStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn conditional_ride_update_rejects_stale_status() {
        let store = DuckStore::open().unwrap();
        let ride = store
            .insert_ride(NewRideRequest::pending(ClientInfo::default(), "Centro"))
            .await
            .unwrap();
        let accept = RidePatch::status(RideStatus::Accepted);
        store
            .update_ride_if(ride.id, RideStatus::Pending, &accept)
            .await
            .unwrap();
        assert!(matches!(
            store.update_ride_if(ride.id, RideStatus::Pending, &accept).await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(store
            .update_ride_if(99, RideStatus::Pending, &accept)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.list_rides(&RideFilter::pending()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistent_reopen_keeps_rows_and_sequences() {
        let tmp = tempfile::TempDir::new().unwrap();
        let db_path = tmp.path().join("jamal.duckdb");

        let store = DuckStore::open_persistent(&db_path).unwrap();
        assert!(db_path.exists());
        store
            .insert_destination(NewDestination::new("Aeroporto", "Rod. Hélio Smidt"))
            .await
            .unwrap();
        drop(store);

        let store = DuckStore::open_persistent(&db_path).unwrap();
        let all = store.list_destinations(false).await.unwrap();
        assert_eq!(all.len(), 1);
        let next = store
            .insert_destination(NewDestination::new("Shopping", "Av. Paulista"))
            .await
            .unwrap();
        assert_eq!(next.id, 2);
    }
}
