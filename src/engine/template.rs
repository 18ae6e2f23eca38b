//! Payload construction: record fields → worker payload, optionally through a template.

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::types::{Payload, Record};

/// Default payload: every column as a string value.
pub fn default_payload(record: &Record) -> Payload {
    record
        .fields()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Build the worker payload for `record`. With no template, see [`default_payload`].
pub fn build_payload(template: Option<&Payload>, record: &Record) -> Result<Payload> {
    match template {
        None => Ok(default_payload(record)),
        Some(t) => t
            .iter()
            .map(|(k, v)| Ok((k.clone(), render_value(v, record)?)))
            .collect(),
    }
}

fn render_value(value: &Value, record: &Record) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(render_str(s, record)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_value(v, record))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_value(v, record)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Replace each `{{name}}` in `s` with the record's `name` field. Unknown names are an error.
pub fn render_str(s: &str, record: &Record) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated placeholder in template: {:?}", s))?;
        let name = after_open[..close].trim();
        let value = record
            .get(name)
            .ok_or_else(|| anyhow!("template references unknown field '{}'", name))?;
        out.push_str(value);
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
