//! Shared application state (spec §4: every handler borrows these through
//! the trait objects, never a concrete gateway/provider type).

use std::sync::Arc;

use waba_core::{PersistenceGateway, TraceEmitter};
use waba_dispatcher::CampaignDispatcher;
use waba_ingestor::ReplyIngestor;
use waba_provider::ProviderClient;
use waba_workflow::WorkflowEngine;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub provider: Arc<dyn ProviderClient>,
    pub engine: Arc<WorkflowEngine>,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub ingestor: Arc<ReplyIngestor>,
    pub trace: Arc<dyn TraceEmitter>,
}
