//! Maps `tokio_postgres` failures onto the shared [`waba_core::Error`]
//! taxonomy (spec §7).
//!
//! A missing table (SQLSTATE `42P01`, `undefined_table`) becomes
//! [`waba_core::Error::MissingTable`] so callers — in particular
//! `waba-trace`'s fail-open sink — can degrade instead of propagating.

use tokio_postgres::error::SqlState;
use waba_core::Error;

/// Table name attached to a `42P01` failure, read back out of the
/// driver's error message since `tokio_postgres` doesn't structure it.
fn missing_relation_name(err: &tokio_postgres::Error, fallback: &str) -> String {
    err.as_db_error()
        .and_then(|e| {
            // Postgres phrases this as `relation "foo" does not exist`.
            let msg = e.message();
            let start = msg.find('"')?;
            let rest = &msg[start + 1..];
            let end = rest.find('"')?;
            Some(rest[..end].to_string())
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Convert a query/connection failure into the shared error taxonomy.
/// `table_hint` names the table the caller was operating against, used
/// as a fallback when Postgres's own message can't be parsed.
pub fn from_postgres(err: tokio_postgres::Error, table_hint: &str) -> Error {
    if let Some(db_err) = err.as_db_error() {
        if db_err.code() == &SqlState::UNDEFINED_TABLE {
            return Error::MissingTable(missing_relation_name(&err, table_hint));
        }
        if db_err.code() == &SqlState::UNIQUE_VIOLATION {
            return Error::Conflict(db_err.message().to_string());
        }
    }
    Error::Internal(format!("postgres error on {table_hint}: {err}"))
}

/// Dedicated error type for connection/schema setup, which happens before
/// any `PersistenceGateway` call exists to translate into `waba_core::Error`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SetupError {
    #[error("failed to connect to postgres: {0}")]
    Connection(#[source] tokio_postgres::Error),
    #[error("failed to initialize schema: {0}")]
    Schema(#[source] tokio_postgres::Error),
}
