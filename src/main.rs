//! selfheal - run a script and let a code model repair it when it fails
//!
//! Exit status is 0 when the script already worked or the fix was verified,
//! and 1 for everything else.

use anyhow::Result;
use clap::Parser;
use selfheal::config::{Config, ConfigOverrides};
use selfheal::fixer::BedrockFixer;
use selfheal::{heal, logging, HealError, HealOutcome, HealRequest};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "selfheal",
    about = "Run a script; if it fails, ask a code model for a fix, write it and verify it",
    version
)]
struct Args {
    /// Path to the script to check and fix
    script: PathBuf,

    /// Interpreter command to run the script with (default: shebang, then extension)
    #[arg(short, long)]
    interpreter: Option<String>,

    /// Service region (overrides AWS_REGION)
    #[arg(long)]
    region: Option<String>,

    /// Model identifier (overrides SELFHEAL_MODEL_ID)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL replacing the regional endpoint (overrides SELFHEAL_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Fail instead of writing the whole response when it has no fenced code block
    #[arg(long)]
    require_fence: bool,

    /// Run the script once and report; never contact the model service
    #[arg(short, long)]
    check: bool,

    /// Debug logging (subprocess output, request details)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // Help and version go to stdout and are not failures
            return if err.use_stderr() {
                exit_code(HealError::Usage.exit_code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    logging::init(args.verbose);

    match heal_script(&args).await {
        Ok(outcome) => {
            report(&outcome);
            exit_code(outcome.exit_code())
        }
        Err(err) => {
            tracing::error!("{}", err);
            if let Some(heal_err) = err.downcast_ref::<HealError>() {
                if heal_err.file_modified() {
                    tracing::warn!(
                        "{} now holds the unverified fix; no backup was kept",
                        args.script.display()
                    );
                }
                return exit_code(heal_err.exit_code());
            }
            ExitCode::FAILURE
        }
    }
}

async fn heal_script(args: &Args) -> Result<HealOutcome> {
    let config = Config::resolve(&ConfigOverrides {
        region: args.region.clone(),
        model_id: args.model.clone(),
        endpoint: args.endpoint.clone(),
        require_fence: args.require_fence,
    });
    tracing::debug!(
        config_file = %Config::config_location(),
        region = %config.region,
        model = %config.model_id,
        "Resolved configuration"
    );

    let request = HealRequest {
        script: args.script.clone(),
        interpreter: args.interpreter.clone(),
        check_only: args.check,
    };
    let fixer = BedrockFixer::new(config);

    Ok(heal::run(&request, &fixer).await?)
}

fn report(outcome: &HealOutcome) {
    match outcome {
        HealOutcome::AlreadyPassing { .. } => {}
        HealOutcome::NeedsFix { output } => {
            tracing::error!("Script fails: {}", output.trim_end());
        }
        HealOutcome::Fixed {
            usage, from_fence, ..
        } => {
            if !from_fence {
                tracing::warn!("The fix was written from an unfenced response; review it");
            }
            if let Some(usage) = usage {
                tracing::info!(
                    "Model usage: {} input + {} output tokens",
                    usage.input_tokens,
                    usage.output_tokens
                );
            }
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}
