//! `{{var}}` template substitution (spec §4.D item 7).

use std::collections::HashMap;

use serde_json::Value;

/// Substitute every `{{key}}` occurrence in `text` with the string form of
/// `variables[key]`; unresolved keys are left untouched (spec does not
/// define a failure mode for a missing template variable at this layer —
/// validation already surfaces missing bindings at precheck time).
#[must_use]
pub fn substitute(text: &str, variables: &HashMap<String, Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = after[..end].trim();
        match variables.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(v) => out.push_str(&v.to_string()),
            None => out.push_str(&format!("{{{{{key}}}}}")),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
