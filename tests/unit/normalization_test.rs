use serde_json::{json, Map, Value};
use strategy_gateway::models::{Step, StepStatus, WebhookPayload};
use strategy_gateway::services::webhook::{build_request_body, normalize_response};

fn payload_with(inputs: Value) -> WebhookPayload {
    let map = match inputs {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    WebhookPayload::new("sub-norm", map).with_timestamp("2024-05-01T12:00:00.000Z")
}

#[test]
fn test_plain_steps_forward_inputs_unchanged() {
    let inputs = json!({"businessName": "Acme", "targetAudience": "founders"});

    for step in [
        Step::ContentCompass,
        Step::MessageMultiplier,
        Step::EventFunnel,
        Step::OfferPrompt,
    ] {
        let body = build_request_body(step, &payload_with(inputs.clone()), None);
        assert_eq!(body["inputs"], inputs, "inputs changed for {}", step);
        assert!(body.get("payload").is_none());
    }
}

#[test]
fn test_aliasing_steps_gain_kebab_keys_without_overwriting() {
    let inputs = json!({
        "businessName": "Acme",
        "idealCustomer": {"age": 40},
        "business-name": "kept as sent"
    });

    let body = build_request_body(Step::AudienceArchitect, &payload_with(inputs), None);
    let sent = &body["inputs"];

    assert_eq!(sent["businessName"], "Acme");
    assert_eq!(sent["business-name"], "kept as sent");
    assert_eq!(sent["ideal-customer"], json!({"age": 40}));
}

#[test]
fn test_only_landing_page_is_enveloped() {
    let inputs = json!({"pageGoal": "signups"});
    let previous = json!({"offer": "audit"});

    let body = build_request_body(Step::LandingPage, &payload_with(inputs), Some(&previous));

    let inner = &body["payload"];
    assert_eq!(body.as_object().map(|o| o.len()), Some(1));
    assert_eq!(inner["submissionId"], "sub-norm");
    assert_eq!(inner["timestamp"], "2024-05-01T12:00:00.000Z");
    assert_eq!(inner["step"], "landingPage");
    assert_eq!(inner["inputs"]["page-goal"], "signups");
    assert_eq!(inner["previousOutput"], previous);
}

#[test]
fn test_failed_status_inside_array_is_detected() {
    let result = normalize_response(
        Step::ContentCompass,
        json!([{"status": "failed", "error": "model overloaded"}]),
    );

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.payload["error"], "model overloaded");
}

#[test]
fn test_assistant_envelope_yields_inner_content() {
    let content = json!({"sub_topics": ["pricing", "onboarding"], "persona": "coach"});
    let body = json!({"payload": {"role": "assistant", "content": content.clone()}});

    let result = normalize_response(Step::MessageMultiplier, body);

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload, content);
}

#[test]
fn test_missing_status_is_completed() {
    let result = normalize_response(
        Step::EventFunnel,
        json!({"data": {"nested": {"deeper": {"value": 1}}}}),
    );

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload["data"]["nested"]["deeper"]["value"], 1);
}

#[test]
fn test_nested_status_is_not_inspected() {
    let result = normalize_response(
        Step::OfferPrompt,
        json!({"payload": {"status": "failed", "reason": "inner only"}}),
    );

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload["reason"], "inner only");
}

#[test]
fn test_empty_array_is_kept_as_payload() {
    let result = normalize_response(Step::OfferPrompt, json!([]));

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload, json!([]));
}

#[test]
fn test_non_object_bodies_pass_through() {
    let result = normalize_response(Step::MessageMultiplier, json!("plain text"));
    assert_eq!(result.payload, json!("plain text"));

    let result = normalize_response(Step::ContentCompass, Value::Null);
    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload, Value::Null);
}

#[test]
fn test_message_multiplier_descends_nested_content() {
    let document = json!({"milestone": "launch", "sub_topics": []});
    let body = json!([{
        "extra": true,
        "content": {
            "content": {
                "payload": {
                    "content": document.clone()
                }
            }
        }
    }]);

    let result = normalize_response(Step::MessageMultiplier, body);

    assert_eq!(result.payload, document);
}

#[test]
fn test_message_multiplier_stops_beyond_depth_limit() {
    let mut value = json!({"persona": "too deep"});
    for _ in 0..7 {
        value = json!({"content": value});
    }
    // one level goes to the content wrapper, the other six exceed the descent limit
    let result = normalize_response(Step::MessageMultiplier, value);

    assert!(result.payload.get("persona").is_none());
    assert!(result.payload.get("content").is_some());
}

#[test]
fn test_other_steps_do_not_unwrap_assistant_envelopes() {
    let body = json!({"payload": {"role": "assistant", "content": {"persona": "x"}}});

    let result = normalize_response(Step::OfferPrompt, body);

    assert_eq!(result.payload["role"], "assistant");
}
