//! Error kinds for a heal run
//!
//! Every failure is terminal: the run stops, the error is logged, and the
//! process exits non-zero. Nothing is rolled back.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for every failed run
pub const EXIT_FAILURE: i32 = 1;

/// The remote code model could not produce a usable fix.
#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error(
        "No credentials found. Set AWS_BEARER_TOKEN_BEDROCK to a Bedrock API key, \
         or configure AWS credentials (AWS_ACCESS_KEY_ID, a profile, or an instance role)."
    )]
    MissingCredentials,

    #[error("Failed to sign request: {0}")]
    Signing(String),

    #[error("Failed to encode request: {0}")]
    Encode(serde_json::Error),

    #[error("Invalid endpoint URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Request to the model service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model service rejected the credentials ({status}): {detail}")]
    Unauthorized { status: u16, detail: String },

    #[error("Throttled by the model service: {detail}")]
    Throttled { detail: String },

    #[error("Model service error ({status}). The service may be temporarily unavailable.")]
    Server { status: u16 },

    #[error("API error {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Failed to parse model response: {reason}\n{preview}")]
    MalformedResponse { reason: String, preview: String },

    #[error("Model response contained no text content")]
    EmptyContent,

    #[error("Model response contained no fenced code block")]
    MissingCodeBlock,
}

/// The target script could not be run at all.
#[derive(Debug, Error)]
#[error("Failed to run {interpreter} {}: {source}", .script.display())]
pub struct ExecutorError {
    pub interpreter: String,
    pub script: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum HealError {
    #[error("Usage: selfheal <script_path>")]
    Usage,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Error reading file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing fixed code to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("Error during fix process: {0}")]
    Remote(#[from] RemoteServiceError),

    #[error("Failed to fix {}: {output}", .path.display())]
    VerificationFailed { path: PathBuf, output: String },

    #[error("Wrote the fix to {} but could not run it: {source}", .path.display())]
    VerificationNotRun {
        path: PathBuf,
        #[source]
        source: ExecutorError,
    },
}

impl HealError {
    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }

    /// Whether the target file was overwritten before this error occurred.
    pub fn file_modified(&self) -> bool {
        matches!(
            self,
            HealError::VerificationFailed { .. } | HealError::VerificationNotRun { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = [
            HealError::Usage,
            HealError::FileNotFound(PathBuf::from("missing.py")),
            HealError::Remote(RemoteServiceError::MissingCredentials),
            HealError::VerificationFailed {
                path: PathBuf::from("a.py"),
                output: "boom".to_string(),
            },
        ];
        for err in &errors {
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn test_only_errors_after_the_write_leave_file_modified() {
        assert!(HealError::VerificationFailed {
            path: PathBuf::from("a.py"),
            output: String::new(),
        }
        .file_modified());

        let spawn_failure = || ExecutorError {
            interpreter: "python3".to_string(),
            script: PathBuf::from("a.py"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(HealError::VerificationNotRun {
            path: PathBuf::from("a.py"),
            source: spawn_failure(),
        }
        .file_modified());
        assert!(!HealError::Executor(spawn_failure()).file_modified());
        assert!(!HealError::Remote(RemoteServiceError::EmptyContent).file_modified());
    }

    #[test]
    fn test_not_found_message_names_path() {
        let err = HealError::FileNotFound(PathBuf::from("scripts/gone.py"));
        assert_eq!(err.to_string(), "File not found: scripts/gone.py");
    }
}
