//! Remote code fixing
//!
//! Turns a failing script and its error output into replacement source by
//! asking a code model once and pulling the code out of its answer.

pub mod auth;
pub mod client;
pub mod models;
pub mod parse;
pub mod prompts;

pub use auth::Auth;
pub use client::BedrockClient;
pub use models::{Completion, Usage};
pub use parse::{extract_fenced_code, extract_fix, ExtractedFix, FencePolicy};

use crate::config::Config;
use crate::error::RemoteServiceError;
use crate::executor::ScriptLanguage;
use prompts::{build_fix_prompt, FIX_SCRIPT_SYSTEM};
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single text-generation call against a remote model
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<Completion, RemoteServiceError>>;
}

/// Anything that can turn a failing script into replacement source
pub trait CodeFixer: Send + Sync {
    fn fix<'a>(&'a self, request: &'a FixRequest) -> BoxFuture<'a, Result<FixResponse, RemoteServiceError>>;
}

#[derive(Debug, Clone)]
pub struct FixRequest {
    pub original_code: String,
    pub error_message: String,
    pub language: ScriptLanguage,
}

#[derive(Debug, Clone)]
pub struct FixResponse {
    /// Model output exactly as received
    pub raw: String,
    /// New file content
    pub code: String,
    pub from_fence: bool,
    pub usage: Option<Usage>,
    /// The model stopped at the token ceiling
    pub truncated: bool,
}

/// Prompt, call, extract. One remote call per fix, no retry.
pub struct Fixer<B> {
    backend: B,
    policy: FencePolicy,
}

impl<B: CompletionBackend> Fixer<B> {
    pub fn new(backend: B, policy: FencePolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn generate(&self, request: &FixRequest) -> Result<FixResponse, RemoteServiceError> {
        tracing::debug!("Preparing fix prompt");
        let prompt = build_fix_prompt(
            &request.original_code,
            &request.error_message,
            request.language,
        );

        let completion = self.backend.complete(FIX_SCRIPT_SYSTEM, &prompt).await?;
        if let Some(usage) = &completion.usage {
            tracing::debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Model usage"
            );
        }
        let truncated = completion.was_truncated();
        if truncated {
            tracing::warn!("Model output hit the token limit; the fix may be incomplete");
        }

        let extracted = extract_fix(&completion.text, request.language.fence_tags(), self.policy)?;
        if !extracted.from_fence {
            tracing::warn!("No fenced code block in model response; using the whole response");
        }
        tracing::debug!("Successfully obtained fixed code");

        Ok(FixResponse {
            raw: completion.text,
            code: extracted.code,
            from_fence: extracted.from_fence,
            usage: completion.usage,
            truncated,
        })
    }
}

impl<B: CompletionBackend> CodeFixer for Fixer<B> {
    fn fix<'a>(&'a self, request: &'a FixRequest) -> BoxFuture<'a, Result<FixResponse, RemoteServiceError>> {
        Box::pin(self.generate(request))
    }
}

/// Fixer backed by Bedrock, built on first use so runs that never need a fix
/// never need credentials.
pub struct BedrockFixer {
    config: Config,
}

impl BedrockFixer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn policy(&self) -> FencePolicy {
        if self.config.require_fence {
            FencePolicy::Strict
        } else {
            FencePolicy::Lenient
        }
    }
}

impl CodeFixer for BedrockFixer {
    fn fix<'a>(&'a self, request: &'a FixRequest) -> BoxFuture<'a, Result<FixResponse, RemoteServiceError>> {
        Box::pin(async move {
            tracing::debug!(model = %self.config.model_id, region = %self.config.region, "Initializing model client");
            let client = BedrockClient::from_config(&self.config).await?;
            Fixer::new(client, self.policy()).generate(request).await
        })
    }
}
