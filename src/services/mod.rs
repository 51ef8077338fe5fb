// Business logic services
// Webhook dispatch to N8N and submission tracking

pub mod submission_service;
pub mod webhook;

pub use submission_service::SubmissionService;
pub use webhook::{RetryPolicy, WebhookError, WebhookService};
