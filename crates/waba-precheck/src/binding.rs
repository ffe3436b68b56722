//! Per-contact variable binding resolution (spec §4.G).
//!
//! A binding is the value stored under each template variable's key in
//! `campaign.template_variables`: a `contact.<field>` or
//! `custom_fields.<key>` path string resolves against the contact; any
//! other JSON value is taken as a literal.

use serde_json::Value;
use waba_core::model::CampaignContact;

/// Resolve one binding for `key` against `contact`, given the raw binding
/// value configured on the campaign. Returns `None` if the binding is
/// absent or points at a field the contact doesn't have.
#[must_use]
pub fn resolve_binding(key: &str, bindings: &Value, contact: &CampaignContact) -> Option<Value> {
    let raw = bindings.get(key)?;
    let Value::String(path) = raw else {
        return Some(raw.clone());
    };

    if let Some(field) = path.strip_prefix("contact.") {
        return match field {
            "name" if !contact.name.is_empty() => Some(Value::String(contact.name.clone())),
            "phone" if !contact.phone.is_empty() => Some(Value::String(contact.phone.clone())),
            "email" if !contact.email.is_empty() => Some(Value::String(contact.email.clone())),
            _ => None,
        };
    }

    if let Some(field) = path.strip_prefix("custom_fields.") {
        return contact.custom_fields.get(field).cloned().filter(|v| !v.is_null());
    }

    // Not a recognized binding path; treat the string itself as literal.
    Some(Value::String(path.clone()))
}

/// Every required variable with no resolvable binding, in declared order.
#[must_use]
pub fn missing_bindings(required: &[String], bindings: &Value, contact: &CampaignContact) -> Vec<String> {
    required
        .iter()
        .filter(|key| resolve_binding(key, bindings, contact).is_none())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact() -> CampaignContact {
        CampaignContact {
            id: "c1".to_string(),
            campaign_id: "camp1".to_string(),
            contact_id: "ct1".to_string(),
            phone: "+5511987654321".to_string(),
            name: "Ana".to_string(),
            email: String::new(),
            custom_fields: json!({ "plan": "gold" }),
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

    #[test]
    fn resolves_contact_field() {
        let bindings = json!({ "nome": "contact.name" });
        let c = contact();
        assert_eq!(
            resolve_binding("nome", &bindings, &c),
            Some(Value::String("Ana".to_string()))
        );
    }

    #[test]
    fn resolves_custom_field() {
        let bindings = json!({ "plano": "custom_fields.plan" });
        let c = contact();
        assert_eq!(
            resolve_binding("plano", &bindings, &c),
            Some(Value::String("gold".to_string()))
        );
    }

    #[test]
    fn resolves_literal() {
        let bindings = json!({ "saudacao": "Olá" });
        let c = contact();
        assert_eq!(
            resolve_binding("saudacao", &bindings, &c),
            Some(Value::String("Olá".to_string()))
        );
    }

    #[test]
    fn reports_missing_required_variable() {
        let bindings = json!({ "nome": "contact.name", "plano": "custom_fields.plan" });
        let required = vec!["nome".to_string(), "plano".to_string(), "terceiro".to_string()];
        let missing = missing_bindings(&required, &bindings, &contact());
        assert_eq!(missing, vec!["terceiro".to_string()]);
    }

    #[test]
    fn missing_contact_field_is_reported() {
        let bindings = json!({ "email": "contact.email" });
        let missing = missing_bindings(&["email".to_string()], &bindings, &contact());
        assert_eq!(missing, vec!["email".to_string()]);
    }
}
