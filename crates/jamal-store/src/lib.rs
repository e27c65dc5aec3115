//! Storage layer: the `Backend` trait, an in-memory store, and DuckDB for offline persistence.

mod backend;
mod error;
mod memory;

pub use backend::{Backend, DriverFilter, RideFilter, SharedBackend, SortOrder};
pub use error::StoreError;
pub use memory::MemoryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
