//! Builds a WhatsApp template-message payload from a resolved binding map
//! (spec §4.E step 3.b, §4.G).

use std::collections::HashMap;

use serde_json::{json, Value};
use waba_core::model::{ComponentKind, HeaderMediaKind, ParameterFormat, Template};

/// A header media reference: the provider-registered handle (every attempt
/// before the first `media_expired`) or a freshly rehosted URL (the single
/// retry per spec §4.G).
#[derive(Debug, Clone)]
pub enum HeaderMediaRef {
    Handle(String),
    Url(String),
}

/// Build `messages` payload for `Provider.send`, given per-variable
/// resolved bindings and, if the template carries header media, the
/// reference to embed.
#[must_use]
pub fn build_template_payload(
    phone: &str,
    template: &Template,
    resolved: &HashMap<String, Value>,
    header_media: Option<&HeaderMediaRef>,
) -> Value {
    let mut components = Vec::new();

    for component in &template.components {
        match component.kind {
            ComponentKind::Header => {
                if let (Some(kind), Some(media)) = (component.header_media, header_media) {
                    components.push(json!({
                        "type": "header",
                        "parameters": [header_media_parameter(kind, media)],
                    }));
                }
            }
            ComponentKind::Body => {
                if !component.variables.is_empty() {
                    let parameters: Vec<Value> = component
                        .variables
                        .iter()
                        .map(|v| {
                            let value = resolved.get(&v.key).cloned().unwrap_or(Value::Null);
                            text_parameter(template.parameter_format, &v.key, &value)
                        })
                        .collect();
                    components.push(json!({ "type": "body", "parameters": parameters }));
                }
            }
            ComponentKind::Footer | ComponentKind::Buttons => {}
        }
    }

    json!({
        "messaging_product": "whatsapp",
        "to": phone,
        "type": "template",
        "template": {
            "name": template.name,
            "language": { "code": template.language },
            "components": components,
        },
    })
}

fn header_media_parameter(kind: HeaderMediaKind, media: &HeaderMediaRef) -> Value {
    let field = match kind {
        HeaderMediaKind::Image => "image",
        HeaderMediaKind::Video => "video",
        HeaderMediaKind::Document => "document",
    };
    let inner = match media {
        HeaderMediaRef::Handle(h) => json!({ "id": h }),
        HeaderMediaRef::Url(u) => json!({ "link": u }),
    };
    json!({ "type": field, field: inner })
}

fn text_parameter(format: ParameterFormat, key: &str, value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    match format {
        ParameterFormat::Positional => json!({ "type": "text", "text": text }),
        ParameterFormat::Named => json!({ "type": "text", "text": text, "parameter_name": key }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waba_core::model::{TemplateComponent, TemplateVariable};

    fn template() -> Template {
        Template {
            name: "welcome".to_string(),
            language: "pt_BR".to_string(),
            category: "MARKETING".to_string(),
            parameter_format: ParameterFormat::Named,
            components: vec![
                TemplateComponent {
                    kind: ComponentKind::Header,
                    header_media: Some(HeaderMediaKind::Image),
                    header_media_handle: Some("handle-1".to_string()),
                    variables: vec![],
                },
                TemplateComponent {
                    kind: ComponentKind::Body,
                    header_media: None,
                    header_media_handle: None,
                    variables: vec![TemplateVariable { key: "nome".to_string() }],
                },
            ],
        }
    }

    #[test]
    fn builds_header_and_body_parameters() {
        let mut resolved = HashMap::new();
        resolved.insert("nome".to_string(), Value::String("Ana".to_string()));
        let media = HeaderMediaRef::Url("https://cdn.example/img.png".to_string());
        let payload = build_template_payload("+5511987654321", &template(), &resolved, Some(&media));
        let components = payload["template"]["components"].as_array().unwrap();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["type"], "header");
        assert_eq!(components[0]["parameters"][0]["image"]["link"], "https://cdn.example/img.png");
        assert_eq!(components[1]["parameters"][0]["parameter_name"], "nome");
        assert_eq!(components[1]["parameters"][0]["text"], "Ana");
    }

    #[test]
    fn initial_attempt_references_the_handle_not_a_url() {
        let media = HeaderMediaRef::Handle("handle-1".to_string());
        let mut resolved = HashMap::new();
        resolved.insert("nome".to_string(), Value::String("Ana".to_string()));
        let payload = build_template_payload("+5511987654321", &template(), &resolved, Some(&media));
        let components = payload["template"]["components"].as_array().unwrap();
        assert_eq!(components[0]["parameters"][0]["image"]["id"], "handle-1");
    }

    #[test]
    fn header_without_media_url_is_omitted() {
        let payload = build_template_payload("+5511987654321", &template(), &HashMap::new(), None);
        let components = payload["template"]["components"].as_array().unwrap();
        // Header dropped; only the body component remains.
        assert_eq!(components.len(), 1);
        assert_eq!(components[0]["type"], "body");
    }
}
