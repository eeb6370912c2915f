//! Pulls ids, statuses, outputs and failure reasons out of provider JSON.

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::jobs::{RawOutput, RawStatus};

/// String (or number rendered as string) at a JSON pointer
pub(crate) fn string_at(body: &Value, pointer: &str) -> Option<String> {
    match body.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Required id at a JSON pointer, or a provider error naming the pointer
pub(crate) fn require_id(provider: &str, body: &Value, pointer: &str) -> ServiceResult<String> {
    string_at(body, pointer).ok_or_else(|| ServiceError::Provider {
        provider: provider.to_string(),
        status: 200,
        body: format!("response has no id at {}: {}", pointer, truncate(body)),
    })
}

fn output_from(value: &Value, id_field: &str) -> Option<RawOutput> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(RawOutput::new(s.clone())),
        Value::Number(n) => Some(RawOutput::new(n.to_string())),
        Value::Object(map) => {
            let id = [id_field, "id", "url", "uri"]
                .iter()
                .find_map(|field| match map.get(*field) {
                    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })?;
            let filename = ["filename", "file_name", "name"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str))
                .map(str::to_string);
            Some(RawOutput { id, filename })
        }
        _ => None,
    }
}

/// Outputs at a JSON pointer: a string, an object, or an array of either
pub(crate) fn outputs_at(body: &Value, pointer: &str, id_field: &str) -> Vec<RawOutput> {
    match body.pointer(pointer) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| output_from(item, id_field))
            .collect(),
        Some(value) => output_from(value, id_field).into_iter().collect(),
        None => Vec::new(),
    }
}

/// First non-empty failure message among the configured pointers
pub(crate) fn failure_reason(body: &Value, pointers: &[String]) -> Option<String> {
    pointers.iter().find_map(|pointer| match body.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    })
}

/// Read one status response using the provider's field layout
pub(crate) fn parse_status(
    provider: &str,
    config: &ProviderConfig,
    body: Value,
) -> ServiceResult<RawStatus> {
    let status = string_at(&body, &config.status_pointer).ok_or_else(|| {
        ServiceError::Provider {
            provider: provider.to_string(),
            status: 200,
            body: format!(
                "status response has no status at {}: {}",
                config.status_pointer,
                truncate(&body)
            ),
        }
    })?;

    Ok(RawStatus {
        outputs: outputs_at(&body, &config.outputs_pointer, &config.output_id_field),
        failure_reason: failure_reason(&body, &config.error_pointers),
        status,
        body,
    })
}

fn truncate(body: &Value) -> String {
    const LIMIT: usize = 512;
    let text = body.to_string();
    if text.len() <= LIMIT {
        return text;
    }
    let mut end = LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
