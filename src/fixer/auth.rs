//! Credentials for the model service
//!
//! A Bedrock API key (`AWS_BEARER_TOKEN_BEDROCK`) is sent as a bearer token.
//! Without one, the standard AWS credential chain is consulted (environment
//! keys, shared profiles, SSO, container and instance roles) and each request
//! is signed with SigV4.

use crate::error::RemoteServiceError;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningParams, SigningSettings};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use std::fmt;
use std::future::Future;
use std::time::SystemTime;
use url::Url;

/// SigV4 service name for the Bedrock runtime
const SIGNING_NAME: &str = "bedrock";

pub enum Auth {
    ApiKey(String),
    Aws(Credentials),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::ApiKey(_) => f.write_str("Auth::ApiKey(**redacted**)"),
            Auth::Aws(credentials) => f.debug_tuple("Auth::Aws").field(credentials).finish(),
        }
    }
}

impl Auth {
    /// Pick credentials: an API key wins; otherwise ask `load_aws`, which is
    /// never called when a key is present.
    pub async fn resolve_with<F, Fut>(api_key: Option<String>, load_aws: F) -> Result<Self, RemoteServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Credentials>>,
    {
        if let Some(key) = api_key {
            tracing::debug!("Using Bedrock API key");
            return Ok(Auth::ApiKey(key));
        }
        let credentials = load_aws().await.ok_or(RemoteServiceError::MissingCredentials)?;
        tracing::debug!(access_key = %credentials.access_key_id(), "Using AWS credentials");
        Ok(Auth::Aws(credentials))
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Auth::ApiKey(_) => "api-key",
            Auth::Aws(_) => "sigv4",
        }
    }
}

/// Credentials from the default AWS chain, or `None` when it has none.
pub async fn default_chain_credentials(region: &str) -> Option<Credentials> {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await;
    let provider = sdk_config.credentials_provider()?;

    match provider.provide_credentials().await {
        Ok(credentials) => Some(credentials),
        Err(err) => {
            tracing::debug!("AWS credential chain found nothing: {}", err);
            None
        }
    }
}

/// Headers that sign a POST of `body` to `url` with SigV4.
///
/// `headers` must hold every header the request will carry besides `host`,
/// which is taken from the URL.
pub fn sigv4_headers(
    credentials: &Credentials,
    region: &str,
    url: &Url,
    headers: &[(&str, &str)],
    body: &[u8],
    time: SystemTime,
) -> Result<Vec<(String, String)>, RemoteServiceError> {
    let identity: Identity = credentials.clone().into();
    let params: SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(SIGNING_NAME)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| RemoteServiceError::Signing(e.to_string()))?
        .into();

    let signable = SignableRequest::new(
        "POST",
        url.as_str(),
        headers.iter().copied(),
        SignableBody::Bytes(body),
    )
    .map_err(|e| RemoteServiceError::Signing(e.to_string()))?;

    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| RemoteServiceError::Signing(e.to_string()))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}
