use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::models::{Step, WebhookPayload};

/// Build the JSON body sent to a step's webhook.
///
/// The body carries `submissionId`, `timestamp`, `step`, `inputs` and, when
/// given, `previousOutput`. Steps that need kebab-case aliases get them added
/// to `inputs`; the landing page body is boxed under `payload`.
pub fn build_request_body(
    step: Step,
    payload: &WebhookPayload,
    previous_output: Option<&Value>,
) -> Value {
    let inputs = if step.requires_kebab_aliases() {
        with_kebab_aliases(&payload.inputs)
    } else {
        payload.inputs.clone()
    };

    let timestamp = payload
        .timestamp
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

    let mut body = Map::new();
    body.insert(
        "submissionId".to_string(),
        Value::String(payload.submission_id.clone()),
    );
    body.insert("timestamp".to_string(), Value::String(timestamp));
    body.insert("step".to_string(), Value::String(step.as_str().to_string()));
    body.insert("inputs".to_string(), Value::Object(inputs));
    if let Some(previous) = previous_output {
        body.insert("previousOutput".to_string(), previous.clone());
    }

    let body = Value::Object(body);
    if step.wraps_request_envelope() {
        let mut envelope = Map::new();
        envelope.insert("payload".to_string(), body);
        Value::Object(envelope)
    } else {
        body
    }
}

/// Serialized bytes of a built body; these are the bytes that get signed.
pub fn to_body_bytes(body: &Value) -> Vec<u8> {
    body.to_string().into_bytes()
}

/// Copy every key under its kebab-case alias unless that alias already exists.
pub fn with_kebab_aliases(inputs: &Map<String, Value>) -> Map<String, Value> {
    let mut aliased = inputs.clone();
    for (key, value) in inputs {
        let alias = to_kebab_case(key);
        if alias != *key && !aliased.contains_key(&alias) {
            aliased.insert(alias, value.clone());
        }
    }
    aliased
}

/// `targetMarket` -> `target-market`
pub fn to_kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        prev = Some(c);
    }
    out
}
