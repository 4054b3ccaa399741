use serde::{Deserialize, Serialize};

/// Messages API version understood by Anthropic models on Bedrock
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Body of an `InvokeModel` request for an Anthropic model
#[derive(Debug, Serialize)]
pub(crate) struct InvokeRequest<'a> {
    pub(crate) anthropic_version: &'static str,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<&'a str>,
    pub(crate) messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Message<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InvokeResponse {
    #[serde(default)]
    pub(crate) content: Vec<ContentBlock>,
    #[serde(default)]
    pub(crate) usage: Option<Usage>,
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
    #[serde(default)]
    pub(crate) model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentBlock {
    #[serde(rename = "type", default)]
    pub(crate) block_type: String,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

/// Token usage reported by the model service
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Generated text plus whatever metadata the service returned
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

impl Completion {
    /// A completion that hit the token ceiling is likely cut off mid-file
    pub fn was_truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}
