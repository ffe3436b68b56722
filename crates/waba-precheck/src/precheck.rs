//! Precheck: per-contact validation before a template send (spec §4.G).

use serde::{Deserialize, Serialize};
use waba_core::model::{CampaignContact, Template};

use crate::binding::missing_bindings;
use crate::phone::normalize_e164;

/// Outcome of prechecking one contact against a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub ok: bool,
    pub normalized_phone: Option<String>,
    pub skip_code: Option<String>,
    pub reason: Option<String>,
    pub missing: Vec<String>,
}

impl PrecheckResult {
    fn invalid_phone() -> Self {
        Self {
            ok: false,
            normalized_phone: None,
            skip_code: Some("invalid_phone".to_string()),
            reason: Some("phone does not normalize to E.164".to_string()),
            missing: Vec::new(),
        }
    }

    fn missing_variables(missing: Vec<String>) -> Self {
        Self {
            ok: false,
            normalized_phone: None,
            skip_code: Some("missing_variables".to_string()),
            reason: Some("required template variables are unresolved".to_string()),
            missing,
        }
    }

    fn ok(normalized_phone: String) -> Self {
        Self {
            ok: true,
            normalized_phone: Some(normalized_phone),
            skip_code: None,
            reason: None,
            missing: Vec::new(),
        }
    }
}

/// Precheck one contact: normalize phone, resolve every variable the
/// template requires (spec §4.G "Precheck").
#[must_use]
pub fn precheck(
    contact: &CampaignContact,
    template: &Template,
    template_variables: &serde_json::Value,
) -> PrecheckResult {
    let Some(normalized) = normalize_e164(&contact.phone) else {
        return PrecheckResult::invalid_phone();
    };

    let required: Vec<String> = template
        .required_variables()
        .into_iter()
        .map(|v| v.key.clone())
        .collect();
    let missing = missing_bindings(&required, template_variables, contact);
    if !missing.is_empty() {
        return PrecheckResult::missing_variables(missing);
    }

    PrecheckResult::ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waba_core::model::{ComponentKind, ParameterFormat, TemplateComponent, TemplateVariable};

    fn contact(phone: &str) -> CampaignContact {
        CampaignContact {
            id: "c1".to_string(),
            campaign_id: "camp1".to_string(),
            contact_id: "ct1".to_string(),
            phone: phone.to_string(),
            name: "Ana".to_string(),
            email: String::new(),
            custom_fields: json!({}),
            status: waba_core::model::ContactStatus::Pending,
            message_id: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            skipped_at: None,
            skip_code: None,
            skip_reason: None,
            error: None,
            rate_limited_retries: 0,
            reaper_retries: 0,
        }
    }

    fn template_with_vars(keys: &[&str]) -> Template {
        Template {
            name: "welcome".to_string(),
            language: "pt_BR".to_string(),
            category: "MARKETING".to_string(),
            parameter_format: ParameterFormat::Named,
            components: vec![TemplateComponent {
                kind: ComponentKind::Body,
                header_media: None,
                header_media_handle: None,
                variables: keys
                    .iter()
                    .map(|k| TemplateVariable { key: (*k).to_string() })
                    .collect(),
            }],
        }
    }

    #[test]
    fn rejects_invalid_phone() {
        let result = precheck(&contact("123"), &template_with_vars(&[]), &json!({}));
        assert!(!result.ok);
        assert_eq!(result.skip_code.as_deref(), Some("invalid_phone"));
    }

    #[test]
    fn reports_missing_third_of_three_variables() {
        let template = template_with_vars(&["nome", "plano", "terceiro"]);
        let bindings = json!({ "nome": "contact.name", "plano": "Gold" });
        let result = precheck(&contact("+5511987654321"), &template, &bindings);
        assert!(!result.ok);
        assert_eq!(result.missing, vec!["terceiro".to_string()]);
    }

    #[test]
    fn ok_when_phone_and_all_variables_resolve() {
        let template = template_with_vars(&["nome"]);
        let bindings = json!({ "nome": "contact.name" });
        let result = precheck(&contact("+5511987654321"), &template, &bindings);
        assert!(result.ok);
        assert_eq!(result.normalized_phone.as_deref(), Some("+5511987654321"));
    }
}
