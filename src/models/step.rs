use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One stage of the strategy generation pipeline.
///
/// Each step is dispatched to its own N8N webhook. The serialized form is the
/// camelCase identifier used on the wire and in API paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    AudienceArchitect,
    ContentCompass,
    MessageMultiplier,
    EventFunnel,
    LandingPage,
    OfferPrompt,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::AudienceArchitect,
        Step::ContentCompass,
        Step::MessageMultiplier,
        Step::EventFunnel,
        Step::LandingPage,
        Step::OfferPrompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::AudienceArchitect => "audienceArchitect",
            Step::ContentCompass => "contentCompass",
            Step::MessageMultiplier => "messageMultiplier",
            Step::EventFunnel => "eventFunnel",
            Step::LandingPage => "landingPage",
            Step::OfferPrompt => "offerPrompt",
        }
    }

    /// Environment variable holding this step's webhook URL
    pub fn env_var(&self) -> &'static str {
        match self {
            Step::AudienceArchitect => "N8N_WEBHOOK_AUDIENCE_ARCHITECT",
            Step::ContentCompass => "N8N_WEBHOOK_CONTENT_COMPASS",
            Step::MessageMultiplier => "N8N_WEBHOOK_MESSAGE_MULTIPLIER",
            Step::EventFunnel => "N8N_WEBHOOK_EVENT_FUNNEL",
            Step::LandingPage => "N8N_WEBHOOK_LANDING_PAGE",
            Step::OfferPrompt => "N8N_WEBHOOK_OFFER_PROMPT",
        }
    }

    /// Workflows for these steps read inputs in either camelCase or kebab-case.
    pub fn requires_kebab_aliases(&self) -> bool {
        matches!(self, Step::AudienceArchitect | Step::LandingPage)
    }

    /// The landing page workflow expects its body boxed under `payload`.
    pub fn wraps_request_envelope(&self) -> bool {
        matches!(self, Step::LandingPage)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("Unknown step: {}", s))
    }
}
