// Domain models shared by the webhook layer and the HTTP API

pub mod step;
pub mod submission;

pub use step::Step;
pub use submission::{StepResult, StepStatus, Submission, SubmissionStatus, WebhookPayload};
