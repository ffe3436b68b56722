//! Trace Sink (spec §4.H): curated phase persistence with fail-open
//! degradation when the backing table is missing.

pub mod sink;
pub mod store;

pub use sink::{TraceSink, WIDEN_ENV_VAR};
pub use store::TraceStore;
