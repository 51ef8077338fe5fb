use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::models::Step;

/// N8N webhook destinations and credentials.
///
/// Built once from the environment and handed to `WebhookService` at
/// construction, so dispatch never reads process globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub urls: HashMap<Step, String>,
    pub auth_token: Option<String>,
    pub signing_secret: Option<String>,
    pub is_production: bool,
}

impl WebhookConfig {
    pub fn new(is_production: bool) -> Self {
        Self {
            is_production,
            ..Default::default()
        }
    }

    pub fn from_env(is_production: bool) -> Self {
        let urls = Step::ALL
            .iter()
            .filter_map(|step| non_empty_var(step.env_var()).map(|url| (*step, url)))
            .collect();

        Self {
            urls,
            auth_token: non_empty_var("N8N_AUTH_TOKEN"),
            signing_secret: non_empty_var("N8N_WEBHOOK_SIGNATURE_SECRET"),
            is_production,
        }
    }

    pub fn with_url(mut self, step: Step, url: impl Into<String>) -> Self {
        self.urls.insert(step, url.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    /// Destination URL for a step, `None` when unconfigured
    pub fn url_for(&self, step: Step) -> Option<&str> {
        self.urls
            .get(&step)
            .map(String::as_str)
            .filter(|url| !url.trim().is_empty())
    }

    pub fn configured_steps(&self) -> Vec<Step> {
        Step::ALL
            .into_iter()
            .filter(|step| self.url_for(*step).is_some())
            .collect()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
