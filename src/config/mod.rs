use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub mod webhook;
pub use webhook::WebhookConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Directory for file-backed submission records, memory only when unset
    pub submissions_dir: Option<PathBuf>,
    pub webhook: WebhookConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let environment =
            resolve_environment(env::var("NODE_ENV").ok(), env::var("ENVIRONMENT").ok());
        let is_production = environment.eq_ignore_ascii_case("production");

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            other => {
                return Err(anyhow::anyhow!(
                    "LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                    other
                ))
            }
        };

        Ok(Config {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT environment variable must be a valid port"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            submissions_dir: env::var("SUBMISSIONS_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            webhook: WebhookConfig::from_env(is_production),
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        self.webhook.is_production
    }
}

/// `NODE_ENV` selects the retry tuning; `ENVIRONMENT` is only a fallback.
fn resolve_environment(node_env: Option<String>, environment: Option<String>) -> String {
    node_env
        .into_iter()
        .chain(environment)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "development".to_string())
}
