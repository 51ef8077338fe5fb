//! Collapse the response envelopes N8N workflows return into `StepResult`.
//!
//! Workflows answer with bare objects, single-element arrays, `{payload: ..}`
//! wrappers or, for the message multiplier, assistant messages nested several
//! levels deep. Nothing here fails: unknown shapes become the payload as-is.

use serde_json::Value;
use tracing::{debug, info};

use crate::models::{Step, StepResult, StepStatus};

/// Keys that mark a message multiplier document once it has been reached
pub const MESSAGE_MARKERS: [&str; 3] = ["sub_topics", "milestone", "persona"];

/// Deepest `.content` / `.payload` chain followed when looking for markers
pub const MAX_UNWRAP_DEPTH: usize = 5;

/// A named rule that either recognises a shape and unwraps it, or passes.
pub struct UnwrapStrategy {
    pub name: &'static str,
    pub apply: fn(&Value) -> Option<Value>,
}

/// Message multiplier unwrap rules, first match wins.
pub const MESSAGE_MULTIPLIER_STRATEGIES: [UnwrapStrategy; 2] = [
    UnwrapStrategy {
        name: "assistant_envelope",
        apply: unwrap_assistant_envelope,
    },
    UnwrapStrategy {
        name: "content_wrapper",
        apply: unwrap_content_wrapper,
    },
];

pub fn normalize_response(step: Step, body: Value) -> StepResult {
    let mut working = unwrap_first_element(body);

    if step == Step::MessageMultiplier {
        working = unwrap_message_multiplier(working);
    }

    let status = if working.get("status").and_then(Value::as_str) == Some("failed") {
        StepStatus::Failed
    } else {
        StepStatus::Completed
    };

    let inner = working.get("payload").filter(|v| !v.is_null()).cloned();
    let payload = inner.unwrap_or(working);

    debug!(
        step = %step,
        status = ?status,
        payload_keys = ?object_keys(&payload),
        "Normalized webhook response"
    );

    StepResult { payload, status }
}

/// A non-empty top-level array stands for its first element.
pub fn unwrap_first_element(body: Value) -> Value {
    match body {
        Value::Array(mut items) if !items.is_empty() => {
            debug!(len = items.len(), "Unwrapping array response to first element");
            items.swap_remove(0)
        }
        other => other,
    }
}

fn unwrap_message_multiplier(mut working: Value) -> Value {
    info!(keys = ?object_keys(&working), "Message multiplier response received");

    for strategy in &MESSAGE_MULTIPLIER_STRATEGIES {
        if let Some(unwrapped) = (strategy.apply)(&working) {
            info!(
                strategy = strategy.name,
                keys = ?object_keys(&unwrapped),
                "Unwrapped message multiplier response"
            );
            working = unwrapped;
            break;
        }
    }

    if has_marker(&working) {
        return working;
    }

    match find_marked_descendant(&working) {
        Some((found, depth)) => {
            info!(
                depth,
                keys = ?object_keys(&found),
                "Found message multiplier document in nested content"
            );
            found
        }
        None => {
            info!("No message multiplier markers found, keeping response as-is");
            working
        }
    }
}

/// `{ payload: { role: "assistant", content: {..} } }` -> `content`
pub fn unwrap_assistant_envelope(value: &Value) -> Option<Value> {
    let payload = value.get("payload")?;
    if payload.get("role").and_then(Value::as_str) != Some("assistant") {
        return None;
    }
    payload.get("content").filter(|c| c.is_object()).cloned()
}

/// `{ content: {..} }` whose content is not already a finished document -> `content`
pub fn unwrap_content_wrapper(value: &Value) -> Option<Value> {
    let content = value.get("content")?.as_object()?;
    if content.contains_key("sub_topics") || content.contains_key("milestone") {
        return None;
    }
    Some(Value::Object(content.clone()))
}

/// Follow `.content` (or else `.payload`) objects until one carries a marker.
pub fn find_marked_descendant(value: &Value) -> Option<(Value, usize)> {
    let mut current = value;
    for depth in 1..=MAX_UNWRAP_DEPTH {
        let next = current
            .get("content")
            .filter(|v| v.is_object())
            .or_else(|| current.get("payload").filter(|v| v.is_object()))?;
        if has_marker(next) {
            return Some((next.clone(), depth));
        }
        current = next;
    }
    None
}

pub fn has_marker(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| MESSAGE_MARKERS.iter().any(|key| obj.contains_key(*key)))
}

fn object_keys(value: &Value) -> Vec<&str> {
    value
        .as_object()
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}
