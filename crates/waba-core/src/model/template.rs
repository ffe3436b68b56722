//! Provider-registered template and form-submission entities (spec §3).

use serde::{Deserialize, Serialize};

/// Whether a template's variables are positional (`{{1}}`) or named
/// (`{{customer_name}}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterFormat {
    Positional,
    Named,
}

/// A template component kind, used to detect header media requiring
/// rehost (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentKind {
    Header,
    Body,
    Footer,
    Buttons,
}

/// Media type carried by a header component, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMediaKind {
    Image,
    Video,
    Document,
}

/// One variable binding required by a template component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Positional index (1-based) or named key, per `parameter_format`.
    pub key: String,
}

/// A single component of a provider-registered template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateComponent {
    pub kind: ComponentKind,
    #[serde(default)]
    pub header_media: Option<HeaderMediaKind>,
    #[serde(default)]
    pub header_media_handle: Option<String>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

/// A provider-registered message template (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub language: String,
    pub category: String,
    pub parameter_format: ParameterFormat,
    pub components: Vec<TemplateComponent>,
}

impl Template {
    /// All variables required across every component, in component order.
    #[must_use]
    pub fn required_variables(&self) -> Vec<&TemplateVariable> {
        self.components.iter().flat_map(|c| &c.variables).collect()
    }

    /// The header media component, if the template has one.
    #[must_use]
    pub fn header_media(&self) -> Option<&TemplateComponent> {
        self.components
            .iter()
            .find(|c| c.kind == ComponentKind::Header && c.header_media.is_some())
    }
}

/// An interactive-form response attached to a provider message id (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSubmission {
    pub id: String,
    pub message_id: String,
    pub raw: serde_json::Value,
    pub mapped: serde_json::Value,
    pub campaign_id: Option<String>,
    pub contact_id: Option<String>,
}
