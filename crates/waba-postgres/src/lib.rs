//! `PostgreSQL`-backed `PersistenceGateway` and `TraceStore` (spec §4.B, §4.H, §6).

mod convert;
mod error;
mod gateway;
mod rows;
mod schema;
mod trace_store;

pub use error::SetupError;
pub use gateway::PostgresGateway;
