//! N8N webhook dispatch for strategy pipeline steps.
//!
//! A call resolves the step URL, builds and signs the body, sends it with a
//! per-attempt deadline and bounded exponential backoff, then normalizes the
//! response into a `StepResult`.

pub mod normalize;
pub mod request;
pub mod retry;
pub mod signing;

use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::WebhookConfig;
use crate::models::{Step, StepResult, WebhookPayload};
use crate::utils::truncate_for_log;

pub use normalize::normalize_response;
pub use request::build_request_body;
pub use retry::{RetryPolicy, RetryReason};
pub use signing::{sign_body, SIGNATURE_HEADER};

/// Longest response excerpt written to error logs
const LOGGED_RESPONSE_CHARS: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("No webhook URL configured for step {step}")]
    NotConfigured { step: Step },

    #[error("Webhook for step {step} timed out after {timeout:?}")]
    Timeout { step: Step, timeout: Duration },

    #[error("Webhook for step {step} failed with status {status} {status_text}: {body}")]
    Http {
        step: Step,
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Webhook request for step {step} failed: {source}")]
    Transport {
        step: Step,
        #[source]
        source: reqwest::Error,
    },

    #[error("Webhook response for step {step} is not valid JSON: {source}")]
    InvalidResponse {
        step: Step,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid webhook credential: {0}")]
    Credential(String),
}

impl WebhookError {
    pub fn step(&self) -> Option<Step> {
        match self {
            WebhookError::NotConfigured { step }
            | WebhookError::Timeout { step, .. }
            | WebhookError::Http { step, .. }
            | WebhookError::Transport { step, .. }
            | WebhookError::InvalidResponse { step, .. } => Some(*step),
            WebhookError::Credential(_) => None,
        }
    }
}

/// Webhook dispatcher for strategy steps
#[derive(Clone)]
pub struct WebhookService {
    client: Client,
    config: Arc<WebhookConfig>,
    policy: RetryPolicy,
}

impl WebhookService {
    /// Dispatcher tuned for the config's environment
    pub fn new(config: WebhookConfig) -> Self {
        let policy = RetryPolicy::for_environment(config.is_production);
        Self::with_policy(config, policy)
    }

    pub fn with_policy(config: WebhookConfig, policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .user_agent(concat!("strategy-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            config: Arc::new(config),
            policy,
        }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one pipeline step through its webhook and normalize the answer.
    pub async fn dispatch_step(
        &self,
        step: Step,
        payload: &WebhookPayload,
        previous_output: Option<&Value>,
    ) -> Result<StepResult, WebhookError> {
        let url = self
            .config
            .url_for(step)
            .ok_or(WebhookError::NotConfigured { step })?;

        let body = build_request_body(step, payload, previous_output);
        let bytes = request::to_body_bytes(&body);

        info!(
            step = %step,
            submission_id = %payload.submission_id,
            has_previous_output = previous_output.is_some(),
            "Dispatching webhook"
        );

        let started = Instant::now();
        let outcome = self.send_with_retry(step, url, bytes).await;
        histogram!("webhook_request_duration_seconds", "step" => step.as_str())
            .record(started.elapsed().as_secs_f64());

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                counter!("webhook_requests_total", "step" => step.as_str(), "outcome" => "error")
                    .increment(1);
                return Err(e);
            }
        };

        let result = normalize_response(step, response);
        let outcome = if result.is_failed() { "failed" } else { "completed" };
        counter!("webhook_requests_total", "step" => step.as_str(), "outcome" => outcome)
            .increment(1);

        info!(step = %step, status = outcome, "Webhook step finished");
        Ok(result)
    }

    /// POST the signed bytes, retrying on 5xx, 429 and timeouts.
    ///
    /// Every attempt re-sends the same bytes under the same signature.
    pub async fn send_with_retry(
        &self,
        step: Step,
        url: &str,
        body: Vec<u8>,
    ) -> Result<Value, WebhookError> {
        let headers = self.build_headers(&body)?;
        let max_retries = self.policy.max_retries;
        let mut attempt: u32 = 0;

        loop {
            debug!(step = %step, attempt, "Sending webhook request");
            let exchange = async {
                let response = self
                    .client
                    .post(url)
                    .headers(headers.clone())
                    .body(body.clone())
                    .send()
                    .await?;
                let status = response.status();
                let bytes = response.bytes().await?;
                Ok::<_, reqwest::Error>((status, bytes))
            };

            // the deadline covers the body as well as the headers
            let reason = match tokio::time::timeout(self.policy.timeout, exchange).await {
                Ok(Ok((status, bytes))) => {
                    if status.is_success() {
                        return parse_json(step, &bytes);
                    }
                    match RetryReason::from_status(status) {
                        Some(reason) if attempt < max_retries => reason,
                        _ => return Err(http_failure(step, status, &bytes, attempt)),
                    }
                }
                Ok(Err(source)) if !source.is_timeout() => {
                    error!(
                        step = %step,
                        attempts = attempt + 1,
                        error = %source,
                        "Webhook dispatch failed"
                    );
                    return Err(WebhookError::Transport { step, source });
                }
                // deadline elapsed, either ours or reqwest's
                Ok(Err(_)) | Err(_) => {
                    if attempt >= max_retries {
                        error!(
                            step = %step,
                            attempts = attempt + 1,
                            timeout_secs = self.policy.timeout.as_secs_f64(),
                            "Webhook dispatch timed out"
                        );
                        return Err(WebhookError::Timeout {
                            step,
                            timeout: self.policy.timeout,
                        });
                    }
                    RetryReason::Timeout
                }
            };

            let delay = self.policy.compute_backoff_delay(attempt);
            let delay_ms = delay.as_millis() as u64;
            match reason {
                RetryReason::RateLimited => warn!(
                    step = %step,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms,
                    "Webhook rate limited, retrying"
                ),
                RetryReason::ServerError => warn!(
                    step = %step,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms,
                    "Webhook server error, retrying"
                ),
                RetryReason::Timeout => warn!(
                    step = %step,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms,
                    "Webhook request timed out, retrying"
                ),
            }
            counter!("webhook_retries_total", "step" => step.as_str(), "reason" => reason.as_str())
                .increment(1);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn build_headers(&self, body: &[u8]) -> Result<HeaderMap, WebhookError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| WebhookError::Credential("auth token is not a valid header value".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(secret) = &self.config.signing_secret {
            let signature =
                sign_body(secret, body).map_err(|e| WebhookError::Credential(e.to_string()))?;
            let value = HeaderValue::from_str(&signature)
                .map_err(|_| WebhookError::Credential("signature is not a valid header value".into()))?;
            headers.insert(SIGNATURE_HEADER, value);
        }

        Ok(headers)
    }
}

fn parse_json(step: Step, bytes: &[u8]) -> Result<Value, WebhookError> {
    serde_json::from_slice(bytes).map_err(|source| {
        error!(
            step = %step,
            response = %truncate_for_log(&String::from_utf8_lossy(bytes), LOGGED_RESPONSE_CHARS),
            "Webhook returned a non-JSON body"
        );
        WebhookError::InvalidResponse { step, source }
    })
}

fn http_failure(step: Step, status: StatusCode, bytes: &[u8], attempt: u32) -> WebhookError {
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(bytes).into_owned();

    error!(
        step = %step,
        status = status.as_u16(),
        status_text = %status_text,
        attempts = attempt + 1,
        response = %truncate_for_log(&body, LOGGED_RESPONSE_CHARS),
        "Webhook dispatch failed"
    );

    WebhookError::Http {
        step,
        status: status.as_u16(),
        status_text,
        body,
    }
}
