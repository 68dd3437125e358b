//! Token substitution for topic and client-ID templates.
//!
//! Recognised tokens, in resolution order: `${deviceId}`, `${timestamp}`,
//! `${modelId}`, then any key present in the device's last-telemetry memo,
//! then any key present in the device's custom state. Resolution happens
//! per call (never cached) so `${timestamp}` reflects the instant of use.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

/// Everything a template may reference about one device at resolution time.
pub struct TemplateContext<'a> {
    pub device_id: &'a str,
    pub model_id: &'a str,
    pub last_telemetry: &'a HashMap<String, Value>,
    pub custom_state: &'a HashMap<String, Value>,
}

/// Substitute every recognised `${token}` in `template`. Unrecognised tokens
/// are left verbatim — the resolver does not error on unknown keys.
pub fn resolve(template: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end_rel;
        out.push_str(&rest[..start]);
        let token = &rest[start + 2..end];
        out.push_str(&resolve_token(token, ctx).unwrap_or_else(|| format!("${{{token}}}")));
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

fn resolve_token(token: &str, ctx: &TemplateContext) -> Option<String> {
    match token {
        "deviceId" => Some(ctx.device_id.to_string()),
        "timestamp" => Some(iso_now()),
        "modelId" => Some(ctx.model_id.to_string()),
        other => ctx
            .last_telemetry
            .get(other)
            .or_else(|| ctx.custom_state.get(other))
            .map(value_to_string),
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// ISO-8601 UTC timestamp with a `Z` suffix, the shape used across every
/// lifecycle event, metrics write, and telemetry payload.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
