use super::auth::{default_chain_credentials, sigv4_headers, Auth};
use super::models::{
    Completion, InvokeRequest, InvokeResponse, Message, ANTHROPIC_VERSION,
};
use super::{BoxFuture, CompletionBackend};
use crate::config::Config;
use crate::error::RemoteServiceError;
use crate::util::{sanitize_api_response, truncate_str};
use serde::Deserialize;
use std::time::SystemTime;
use url::{form_urlencoded, Url};

/// Maximum characters of a malformed body echoed into an error
const MAX_PREVIEW_LEN: usize = 200;

const JSON: &str = "application/json";

/// Client for the Bedrock runtime `InvokeModel` endpoint
pub struct BedrockClient {
    http: reqwest::Client,
    invoke_url: Url,
    auth: Auth,
    region: String,
    max_tokens: u32,
    temperature: f32,
}

impl BedrockClient {
    /// Build a client from the resolved config. A Bedrock API key in the
    /// environment is preferred; otherwise the AWS credential chain is used.
    pub async fn from_config(config: &Config) -> Result<Self, RemoteServiceError> {
        let auth = Auth::resolve_with(Config::api_key(), || {
            default_chain_credentials(&config.region)
        })
        .await?;
        Self::new(config, auth)
    }

    pub fn new(config: &Config, auth: Auth) -> Result<Self, RemoteServiceError> {
        Ok(Self {
            http: reqwest::Client::new(),
            invoke_url: invoke_url(config)?,
            auth,
            region: config.region.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn invoke_url(&self) -> &Url {
        &self.invoke_url
    }

    /// The authenticated `InvokeModel` request, ready to send.
    fn build_request(&self, system: &str, prompt: &str) -> Result<reqwest::Request, RemoteServiceError> {
        let request = InvokeRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: Some(system).filter(|s| !s.is_empty()),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };
        let body = serde_json::to_vec(&request).map_err(RemoteServiceError::Encode)?;

        let builder = self
            .http
            .post(self.invoke_url.clone())
            .header("content-type", JSON)
            .header("accept", JSON);

        let builder = match &self.auth {
            Auth::ApiKey(key) => builder.bearer_auth(key),
            Auth::Aws(credentials) => {
                let signed = sigv4_headers(
                    credentials,
                    &self.region,
                    &self.invoke_url,
                    &[("content-type", JSON), ("accept", JSON)],
                    &body,
                    SystemTime::now(),
                )?;
                signed
                    .into_iter()
                    .fold(builder, |builder, (name, value)| builder.header(name, value))
            }
        };

        Ok(builder.body(body).build()?)
    }

    async fn invoke(&self, system: &str, prompt: &str) -> Result<Completion, RemoteServiceError> {
        let request = self.build_request(system, prompt)?;

        tracing::debug!(
            url = %self.invoke_url,
            auth = self.auth.describe(),
            prompt_chars = prompt.chars().count(),
            "Calling model service"
        );

        let response = self.http.execute(request).await?;

        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(status = status.as_u16(), body_chars = text.len(), "Model service responded");
        parse_invoke_response(status.as_u16(), &text)
    }
}

impl CompletionBackend for BedrockClient {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<Completion, RemoteServiceError>> {
        Box::pin(self.invoke(system, prompt))
    }
}

/// `https://bedrock-runtime.{region}.amazonaws.com/model/{model_id}/invoke`,
/// or the same path under the configured endpoint override. The model id is
/// percent-encoded (`:` becomes `%3A`) as the service expects.
pub fn invoke_url(config: &Config) -> Result<Url, RemoteServiceError> {
    let base = match &config.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => format!("https://bedrock-runtime.{}.amazonaws.com", config.region),
    };

    let mut url = Url::parse(&base).map_err(|e| RemoteServiceError::InvalidEndpoint {
        url: base.clone(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(RemoteServiceError::InvalidEndpoint {
            url: base,
            reason: "URL cannot carry a path".to_string(),
        });
    }

    let model: String = form_urlencoded::byte_serialize(config.model_id.as_bytes()).collect();
    let path = format!("{}/model/{}/invoke", url.path().trim_end_matches('/'), model);
    url.set_path(&path);

    Ok(url)
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    #[serde(alias = "Message")]
    message: String,
}

/// Map an HTTP status and body to generated text or a typed failure.
pub(crate) fn parse_invoke_response(status: u16, body: &str) -> Result<Completion, RemoteServiceError> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<ServiceErrorBody>(body)
            .map(|e| sanitize_api_response(&e.message))
            .unwrap_or_else(|_| sanitize_api_response(body));

        return Err(match status {
            401 | 403 => RemoteServiceError::Unauthorized { status, detail },
            429 => RemoteServiceError::Throttled { detail },
            500..=599 => RemoteServiceError::Server { status },
            _ => RemoteServiceError::Status { status, detail },
        });
    }

    let parsed: InvokeResponse =
        serde_json::from_str(body).map_err(|e| RemoteServiceError::MalformedResponse {
            reason: e.to_string(),
            preview: truncate_str(body, MAX_PREVIEW_LEN).to_string(),
        })?;

    if let Some(model) = &parsed.model {
        tracing::debug!(model = %model, "Response model");
    }

    let text = parsed
        .content
        .into_iter()
        .filter(|block| block.block_type == "text" || block.block_type.is_empty())
        .find_map(|block| block.text)
        .ok_or(RemoteServiceError::EmptyContent)?;

    Ok(Completion {
        text,
        usage: parsed.usage,
        stop_reason: parsed.stop_reason,
    })
}
