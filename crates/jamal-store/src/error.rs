use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: String },

    #[error("driver code {0:?} already exists")]
    DuplicateCode(String),

    #[error("{table} row {id} is no longer {expected}")]
    Conflict {
        table: &'static str,
        id: String,
        expected: String,
    },

    #[error("table {0} does not exist; apply the schema from `jamal db init-sql` first")]
    MissingTable(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn not_found(table: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            table,
            id: id.to_string(),
        }
    }

    pub fn conflict(table: &'static str, id: impl ToString, expected: impl ToString) -> Self {
        StoreError::Conflict {
            table,
            id: id.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
