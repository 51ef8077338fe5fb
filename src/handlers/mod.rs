// HTTP handlers for the strategy gateway

pub mod health;
pub mod metrics;
pub mod steps;
pub mod submissions;

pub use health::health_check;
pub use metrics::get_prometheus_metrics;
pub use steps::run_step;
pub use submissions::{get_submission, list_submissions};
