use anyhow::Result;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strategy_gateway::config::WebhookConfig;
use strategy_gateway::models::{Step, StepStatus, WebhookPayload};
use strategy_gateway::services::webhook::{sign_body, RetryPolicy, WebhookError, WebhookService};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOOK_PATH: &str = "/webhook/strategy";

/// Retry budget with millisecond sleeps so tests stay fast
fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::production()
        .with_max_retries(max_retries)
        .with_delays(Duration::from_millis(5), Duration::from_millis(20))
        .with_timeout(Duration::from_secs(5))
}

fn service_for(server: &MockServer, step: Step, policy: RetryPolicy) -> WebhookService {
    let config = WebhookConfig::new(false).with_url(step, format!("{}{}", server.uri(), HOOK_PATH));
    WebhookService::with_policy(config, policy)
}

fn inputs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"headline": "Grow"})))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::OfferPrompt, fast_policy(3));
    let payload = WebhookPayload::new("sub-retry", Map::new());

    let result = service.dispatch_step(Step::OfferPrompt, &payload, None).await?;

    assert_eq!(result.status, StepStatus::Completed);
    assert_eq!(result.payload, json!({"headline": "Grow"}));
    Ok(())
}

#[tokio::test]
async fn test_retry_budget_exhaustion_surfaces_last_http_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::ContentCompass, fast_policy(2));
    let payload = WebhookPayload::new("sub-exhausted", Map::new());

    let err = service
        .dispatch_step(Step::ContentCompass, &payload, None)
        .await
        .unwrap_err();

    match err {
        WebhookError::Http {
            step,
            status,
            body,
            ..
        } => {
            assert_eq!(step, Step::ContentCompass);
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"payload": {"ok": true}}])))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::EventFunnel, fast_policy(2));
    let payload = WebhookPayload::new("sub-429", Map::new());

    let result = service.dispatch_step(Step::EventFunnel, &payload, None).await?;

    assert_eq!(result.payload, json!({"ok": true}));
    Ok(())
}

#[tokio::test]
async fn test_client_errors_are_not_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("workflow not active"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::OfferPrompt, fast_policy(3));
    let payload = WebhookPayload::new("sub-404", Map::new());

    let err = service
        .dispatch_step(Step::OfferPrompt, &payload, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::Http { status: 404, .. }));
    Ok(())
}

#[tokio::test]
async fn test_slow_webhook_times_out_after_every_attempt() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"late": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let policy = fast_policy(1).with_timeout(Duration::from_millis(50));
    let service = service_for(&server, Step::AudienceArchitect, policy);
    let payload = WebhookPayload::new("sub-slow", Map::new());

    let err = service
        .dispatch_step(Step::AudienceArchitect, &payload, None)
        .await
        .unwrap_err();

    match err {
        WebhookError::Timeout { step, timeout } => {
            assert_eq!(step, Step::AudienceArchitect);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_non_json_success_body_is_invalid_response() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::OfferPrompt, fast_policy(3));
    let payload = WebhookPayload::new("sub-html", Map::new());

    let err = service
        .dispatch_step(Step::OfferPrompt, &payload, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::InvalidResponse { .. }));
    Ok(())
}

#[tokio::test]
async fn test_credentials_are_sent_as_headers() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .and(header("authorization", "Bearer n8n-token"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let config = WebhookConfig::new(false)
        .with_url(Step::OfferPrompt, format!("{}{}", server.uri(), HOOK_PATH))
        .with_auth_token("n8n-token")
        .with_signing_secret("hook-secret");
    let service = WebhookService::with_policy(config, fast_policy(0));
    let payload = WebhookPayload::new("sub-signed", Map::new()).with_timestamp("2024-05-01T00:00:00.000Z");

    service.dispatch_step(Step::OfferPrompt, &payload, None).await?;

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    let signature = request
        .headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(signature, Some(sign_body("hook-secret", &request.body).map_err(|e| anyhow::anyhow!("{}", e))?));
    Ok(())
}

#[tokio::test]
async fn test_landing_page_body_is_enveloped_with_aliases() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .and(body_partial_json(json!({
            "payload": {
                "submissionId": "sub-landing",
                "step": "landingPage",
                "inputs": {
                    "businessName": "Acme",
                    "business-name": "Acme"
                },
                "previousOutput": {"offer": "free audit"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hero": "Welcome"})))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::LandingPage, fast_policy(0));
    let payload = WebhookPayload::new("sub-landing", inputs(json!({"businessName": "Acme"})));
    let previous = json!({"offer": "free audit"});

    let result = service
        .dispatch_step(Step::LandingPage, &payload, Some(&previous))
        .await?;

    assert_eq!(result.payload, json!({"hero": "Welcome"}));
    Ok(())
}

#[tokio::test]
async fn test_failed_status_from_workflow_is_reported() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "failed", "payload": {"reason": "quota"}})),
        )
        .mount(&server)
        .await;

    let service = service_for(&server, Step::ContentCompass, fast_policy(0));
    let payload = WebhookPayload::new("sub-failed", Map::new());

    let result = service.dispatch_step(Step::ContentCompass, &payload, None).await?;

    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.payload, json!({"reason": "quota"}));
    Ok(())
}

#[tokio::test]
async fn test_unconfigured_step_makes_no_request() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    // URL registered for a different step
    let service = service_for(&server, Step::OfferPrompt, fast_policy(3));
    let payload = WebhookPayload::new("sub-missing", Map::new());

    let err = service
        .dispatch_step(Step::EventFunnel, &payload, None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::NotConfigured { step: Step::EventFunnel }));
    Ok(())
}

#[tokio::test]
async fn test_production_bound_allows_three_retries() -> Result<()> {
    let policy = RetryPolicy::production()
        .with_delays(Duration::from_millis(5), Duration::from_millis(20));
    let retries = u64::from(policy.max_retries);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::OfferPrompt, policy);
    let payload = WebhookPayload::new("sub-prod-bound", Map::new());

    let result = service.dispatch_step(Step::OfferPrompt, &payload, None).await?;

    assert_eq!(retries, 3);
    assert_eq!(result.payload, json!({"ok": true}));
    assert_eq!(
        server.received_requests().await.unwrap_or_default().len() as u64,
        retries + 1
    );
    Ok(())
}

#[tokio::test]
async fn test_development_bound_stops_after_two_retries() -> Result<()> {
    let policy = RetryPolicy::development()
        .with_delays(Duration::from_millis(5), Duration::from_millis(20));
    let retries = u64::from(policy.max_retries);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("still down"))
        .up_to_n_times(3)
        .expect(retries + 1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(0)
        .mount(&server)
        .await;

    let service = service_for(&server, Step::OfferPrompt, policy);
    let payload = WebhookPayload::new("sub-dev-bound", Map::new());

    let err = service
        .dispatch_step(Step::OfferPrompt, &payload, None)
        .await
        .unwrap_err();

    assert_eq!(retries, 2);
    assert!(matches!(err, WebhookError::Http { status: 500, .. }));
    Ok(())
}

#[tokio::test]
async fn test_timed_out_attempt_is_retried_until_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"late": true}))
                .set_delay(Duration::from_millis(500)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(HOOK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"onTime": true})))
        .expect(1)
        .mount(&server)
        .await;

    let policy = fast_policy(2).with_timeout(Duration::from_millis(100));
    let service = service_for(&server, Step::EventFunnel, policy);
    let payload = WebhookPayload::new("sub-retry-timeout", Map::new());

    let result = service.dispatch_step(Step::EventFunnel, &payload, None).await?;

    assert_eq!(result.payload, json!({"onTime": true}));
    Ok(())
}

#[tokio::test]
async fn test_stalled_body_hits_attempt_deadline() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let upstream = tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // headers promise 100 bytes, only a fragment follows
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"partial\":",
                )
                .await;
            open.push(socket);
        }
    });

    let config = WebhookConfig::new(false)
        .with_url(Step::ContentCompass, format!("http://{}{}", addr, HOOK_PATH));
    let policy = fast_policy(0).with_timeout(Duration::from_millis(200));
    let service = WebhookService::with_policy(config, policy);
    let payload = WebhookPayload::new("sub-stalled", Map::new());

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        service.dispatch_step(Step::ContentCompass, &payload, None),
    )
    .await;
    upstream.abort();

    let err = outcome
        .map_err(|_| anyhow::anyhow!("dispatch outlived its attempt deadline"))?
        .unwrap_err();
    assert!(matches!(err, WebhookError::Timeout { step: Step::ContentCompass, .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn test_transport_errors_are_not_retried() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    let upstream = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // hang up without answering
            drop(socket);
        }
    });

    let config = WebhookConfig::new(false)
        .with_url(Step::OfferPrompt, format!("http://{}{}", addr, HOOK_PATH));
    let service = WebhookService::with_policy(config, fast_policy(3));
    let payload = WebhookPayload::new("sub-hangup", Map::new());

    let err = service
        .dispatch_step(Step::OfferPrompt, &payload, None)
        .await
        .unwrap_err();

    // leave room for a retry to show up if one were sent
    tokio::time::sleep(Duration::from_millis(100)).await;
    upstream.abort();

    assert!(matches!(err, WebhookError::Transport { step: Step::OfferPrompt, .. }));
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    Ok(())
}
