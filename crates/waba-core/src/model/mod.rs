//! Domain entities (spec §3).

pub mod campaign;
pub mod template;
pub mod trace;
pub mod workflow;

pub use campaign::{
    Campaign, CampaignContact, CampaignCounters, CampaignStatus, ContactStatus, StatusEvent,
    WebhookStatus,
};
pub use template::{
    ComponentKind, FlowSubmission, HeaderMediaKind, ParameterFormat, Template, TemplateComponent,
    TemplateVariable,
};
pub use trace::{mask_phone, TraceEvent};
pub use workflow::{
    ConversationStatus, ExecutionConfig, NodeKind, RunStatus, StepStatus, TriggerType, Visibility,
    Workflow, WorkflowConversation, WorkflowEdge, WorkflowNode, WorkflowRun, WorkflowRunLog,
    WorkflowVersion,
};
