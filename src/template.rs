use serde_json::Value;

use crate::types::Record;

/// Expand `{{field.path}}` placeholders in a target template.
///
/// Each placeholder is replaced by the dot-path lookup against the
/// record. A lookup that yields nothing leaves the placeholder text in
/// place: an unresolved placeholder in a destination is visible
/// evidence of a misconfigured route, where a silent blank would not
/// be. An unterminated `{{` is copied through verbatim.
pub fn resolve_target(template: &str, record: &Record) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let path = after_open[..close].trim();
        match record.lookup(path) {
            Some(value) => out.push_str(&render_value(&value)),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }

        rest = &after_open[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Strings render as their text; other values as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
