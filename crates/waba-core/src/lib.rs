//! Domain model, error taxonomy, and Persistence Gateway trait shared by
//! every crate in the messaging automation core.

pub mod error;
pub mod gateway;
pub mod ids;
pub mod memory_gateway;
pub mod model;
pub mod settings;
pub mod sink;

pub use error::{Error, ProviderErrorClass, Result};
pub use gateway::{
    ContactOutcome, OpenConversationRequest, PersistenceGateway, StatusApplyOutcome,
    StatusEventInput,
};
pub use memory_gateway::MemoryGateway;
pub use sink::{NoopTraceEmitter, TraceEmitter};
