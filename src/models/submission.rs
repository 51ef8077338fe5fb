use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Step;

/// Outbound webhook body before step-specific augmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub submission_id: String,
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl WebhookPayload {
    pub fn new(submission_id: impl Into<String>, inputs: Map<String, Value>) -> Self {
        Self {
            submission_id: submission_id.into(),
            inputs,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

/// Normalized outcome of a webhook step, whatever shape N8N answered with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub payload: Value,
    pub status: StepStatus,
}

impl StepResult {
    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Completed,
    Failed,
}

impl From<StepStatus> for SubmissionStatus {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Completed => SubmissionStatus::Completed,
            StepStatus::Failed => SubmissionStatus::Failed,
        }
    }
}

/// A tracked form submission for one pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub step: Step,
    pub inputs: Map<String, Value>,
    pub status: SubmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(step: Step, inputs: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            step,
            inputs,
            status: SubmissionStatus::Pending,
            payload: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
