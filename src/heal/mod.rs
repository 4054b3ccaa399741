//! The run, fix, verify loop
//!
//! Linear and terminal on the first branch outcome:
//! check -> (passing: done) | fix -> write -> verify -> done

use crate::error::HealError;
use crate::executor::{self, resolve_interpreter};
use crate::fixer::{CodeFixer, FixRequest, Usage};
use crate::util::{hash_str, truncate};
use std::fmt;
use std::fs;
use std::path::PathBuf;

#[cfg(test)]
mod tests;

/// Characters of script output repeated in the final report line
const REPORT_OUTPUT_CHARS: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct HealRequest {
    pub script: PathBuf,
    /// Interpreter command overriding shebang and extension detection
    pub interpreter: Option<String>,
    /// Run once and report; never contact the model service
    pub check_only: bool,
}

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealStage {
    Checking,
    Fixing,
    Writing,
    Verifying,
    Done,
}

impl fmt::Display for HealStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealStage::Checking => "checking",
            HealStage::Fixing => "fixing",
            HealStage::Writing => "writing",
            HealStage::Verifying => "verifying",
            HealStage::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub enum HealOutcome {
    /// First run passed; the file was not touched
    AlreadyPassing { output: String },
    /// First run failed in check-only mode; the file was not touched
    NeedsFix { output: String },
    /// The fix was written and the verification run passed
    Fixed {
        output: String,
        usage: Option<Usage>,
        from_fence: bool,
    },
}

impl HealOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            HealOutcome::AlreadyPassing { .. } | HealOutcome::Fixed { .. } => 0,
            HealOutcome::NeedsFix { .. } => crate::error::EXIT_FAILURE,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            HealOutcome::AlreadyPassing { output }
            | HealOutcome::NeedsFix { output }
            | HealOutcome::Fixed { output, .. } => output,
        }
    }

    pub fn file_modified(&self) -> bool {
        matches!(self, HealOutcome::Fixed { .. })
    }
}

fn enter(stage: HealStage) {
    tracing::debug!(stage = %stage, "Stage");
}

/// Run the script; if it fails, ask `fixer` once, overwrite the file with the
/// answer and run it again.
///
/// The file is written at most once, and only when the first run failed.
/// A failed verification leaves the new content in place.
pub async fn run(request: &HealRequest, fixer: &dyn CodeFixer) -> Result<HealOutcome, HealError> {
    let script = &request.script;
    tracing::info!("Processing file: {}", script.display());

    if !script.exists() {
        return Err(HealError::FileNotFound(script.clone()));
    }

    let original_code = fs::read_to_string(script).map_err(|source| HealError::Read {
        path: script.clone(),
        source,
    })?;
    tracing::debug!(hash = %hash_str(&original_code), "Read original code from {}", script.display());

    let interpreter = resolve_interpreter(script, &original_code, request.interpreter.as_deref());

    enter(HealStage::Checking);
    tracing::info!("Attempting to run script");
    let first = executor::execute(script, &interpreter).await?;

    if first.succeeded {
        tracing::info!("Script {} runs successfully", script.display());
        enter(HealStage::Done);
        return Ok(HealOutcome::AlreadyPassing {
            output: first.output,
        });
    }

    if request.check_only {
        tracing::info!("Found errors in {} (check only, not fixing)", script.display());
        enter(HealStage::Done);
        return Ok(HealOutcome::NeedsFix {
            output: first.output,
        });
    }

    enter(HealStage::Fixing);
    tracing::info!("Found errors in {}, attempting to fix...", script.display());
    let fix_request = FixRequest {
        original_code,
        error_message: first.output,
        language: interpreter.language,
    };
    let fix = fixer.fix(&fix_request).await?;

    enter(HealStage::Writing);
    fs::write(script, &fix.code).map_err(|source| HealError::Write {
        path: script.clone(),
        source,
    })?;
    tracing::info!(hash = %hash_str(&fix.code), "Wrote fixed code to {}", script.display());

    enter(HealStage::Verifying);
    tracing::info!("Verifying the fix");
    let verification = executor::execute(script, &interpreter)
        .await
        .map_err(|source| HealError::VerificationNotRun {
            path: script.clone(),
            source,
        })?;
    enter(HealStage::Done);

    if verification.succeeded {
        tracing::info!("Successfully fixed {}", script.display());
        Ok(HealOutcome::Fixed {
            output: verification.output,
            usage: fix.usage,
            from_fence: fix.from_fence,
        })
    } else {
        Err(HealError::VerificationFailed {
            path: script.clone(),
            output: truncate(verification.output.trim_end(), REPORT_OUTPUT_CHARS),
        })
    }
}
