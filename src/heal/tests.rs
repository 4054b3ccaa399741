use super::*;
use crate::error::RemoteServiceError;
use crate::fixer::{BoxFuture, Completion, CompletionBackend, FencePolicy, Fixer};
use std::path::Path;
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};

/// Canned model: answers every call with the same text and records prompts.
struct ScriptedModel {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn answering(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl CompletionBackend for ScriptedModel {
    fn complete<'a>(
        &'a self,
        _system: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<Completion, RemoteServiceError>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let result = match &self.reply {
            Some(text) => Ok(Completion {
                text: text.clone(),
                usage: None,
                stop_reason: Some("end_turn".to_string()),
            }),
            None => Err(RemoteServiceError::Throttled {
                detail: "Too many requests".to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn request_for(path: &Path) -> HealRequest {
    HealRequest {
        script: path.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn stage_labels() {
    assert_eq!(HealStage::Checking.to_string(), "checking");
    assert_eq!(HealStage::Verifying.to_string(), "verifying");
}

#[test]
fn outcome_exit_codes() {
    let passing = HealOutcome::AlreadyPassing {
        output: String::new(),
    };
    let needs_fix = HealOutcome::NeedsFix {
        output: "boom".to_string(),
    };
    assert_eq!(passing.exit_code(), 0);
    assert_eq!(needs_fix.exit_code(), 1);
    assert!(!passing.file_modified());
}

#[tokio::test]
async fn missing_file_is_reported_without_calling_model() {
    let dir = tempdir().unwrap();
    let fixer = Fixer::new(ScriptedModel::answering("unused"), FencePolicy::Lenient);

    let err = run(&request_for(&dir.path().join("nope.sh")), &fixer)
        .await
        .unwrap_err();
    assert!(matches!(err, HealError::FileNotFound(_)));
    assert_eq!(fixer.backend().calls(), 0);
}

#[cfg(unix)]
mod scripts {
    use super::*;

    const ZERO_DIVISION: &str =
        "echo 'Traceback (most recent call last):' >&2\necho 'ZeroDivisionError: division by zero' >&2\nexit 1\n";

    #[tokio::test]
    async fn passing_script_is_never_modified() {
        let dir = tempdir().unwrap();
        let body = "echo all good\n";
        let script = write_script(&dir, "ok.sh", body);
        let fixer = Fixer::new(ScriptedModel::answering("```sh\nexit 1\n```"), FencePolicy::Lenient);

        let outcome = run(&request_for(&script), &fixer).await.unwrap();
        assert!(matches!(outcome, HealOutcome::AlreadyPassing { .. }));
        assert_eq!(outcome.output(), "all good\n");
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(fs::read_to_string(&script).unwrap(), body);
        assert_eq!(fixer.backend().calls(), 0);
    }

    #[tokio::test]
    async fn repeated_runs_on_passing_script_change_nothing() {
        let dir = tempdir().unwrap();
        let body = "echo stable\n";
        let script = write_script(&dir, "stable.sh", body);
        let fixer = Fixer::new(ScriptedModel::answering("```sh\nexit 1\n```"), FencePolicy::Lenient);

        for _ in 0..2 {
            let outcome = run(&request_for(&script), &fixer).await.unwrap();
            assert!(!outcome.file_modified());
            assert_eq!(fs::read_to_string(&script).unwrap(), body);
        }
        assert_eq!(fixer.backend().calls(), 0);
    }

    #[tokio::test]
    async fn failing_script_is_fixed_from_fenced_block() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "divide.sh", ZERO_DIVISION);
        let reply = "The script divides by zero. Here is the corrected version:\n\n```sh\necho 'The result is: 1'\n```\n\nThis avoids the error.";
        let fixer = Fixer::new(ScriptedModel::answering(reply), FencePolicy::Lenient);

        let outcome = run(&request_for(&script), &fixer).await.unwrap();
        match &outcome {
            HealOutcome::Fixed {
                output, from_fence, ..
            } => {
                assert_eq!(output, "The result is: 1\n");
                assert!(*from_fence);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            fs::read_to_string(&script).unwrap(),
            "echo 'The result is: 1'"
        );

        let model = fixer.backend();
        assert_eq!(model.calls(), 1);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains(
            "Traceback (most recent call last):\nZeroDivisionError: division by zero\n"
        ));
        assert!(prompts[0].contains(ZERO_DIVISION));
    }

    #[tokio::test]
    async fn unfenced_reply_is_written_verbatim() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "broken.sh", "exit 2\n");
        let reply = "echo fixed\n";
        let fixer = Fixer::new(ScriptedModel::answering(reply), FencePolicy::Lenient);

        let outcome = run(&request_for(&script), &fixer).await.unwrap();
        assert!(outcome.file_modified());
        assert_eq!(fs::read_to_string(&script).unwrap(), reply);
    }

    #[tokio::test]
    async fn failed_verification_keeps_new_content() {
        let dir = tempdir().unwrap();
        let script = write_script(&dir, "still_broken.sh", "exit 1\n");
        let fixer = Fixer::new(
            ScriptedModel::answering("```sh\necho 'nope' >&2\nexit 4\n```"),
            FencePolicy::Lenient,
        );

        let err = run(&request_for(&script), &fixer).await.unwrap_err();
        match &err {
            HealError::VerificationFailed { output, .. } => assert_eq!(output, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.file_modified());
        assert_eq!(
            fs::read_to_string(&script).unwrap(),
            "echo 'nope' >&2\nexit 4"
        );
        assert_eq!(fixer.backend().calls(), 1);
    }

    #[tokio::test]
    async fn remote_failure_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let body = "exit 1\n";
        let script = write_script(&dir, "broken.sh", body);
        let fixer = Fixer::new(ScriptedModel::failing(), FencePolicy::Lenient);

        let err = run(&request_for(&script), &fixer).await.unwrap_err();
        assert!(matches!(
            err,
            HealError::Remote(RemoteServiceError::Throttled { .. })
        ));
        assert_eq!(fs::read_to_string(&script).unwrap(), body);
        assert_eq!(fixer.backend().calls(), 1);
    }

    #[tokio::test]
    async fn strict_fence_policy_refuses_commentary() {
        let dir = tempdir().unwrap();
        let body = "exit 1\n";
        let script = write_script(&dir, "broken.sh", body);
        let fixer = Fixer::new(
            ScriptedModel::answering("I am not sure what this script should do."),
            FencePolicy::Strict,
        );

        let err = run(&request_for(&script), &fixer).await.unwrap_err();
        assert!(matches!(
            err,
            HealError::Remote(RemoteServiceError::MissingCodeBlock)
        ));
        assert_eq!(fs::read_to_string(&script).unwrap(), body);
    }

    #[tokio::test]
    async fn check_only_reports_without_fixing() {
        let dir = tempdir().unwrap();
        let body = "echo 'bad things' >&2\nexit 1\n";
        let script = write_script(&dir, "broken.sh", body);
        let fixer = Fixer::new(ScriptedModel::answering("```sh\ntrue\n```"), FencePolicy::Lenient);

        let request = HealRequest {
            check_only: true,
            ..request_for(&script)
        };
        let outcome = run(&request, &fixer).await.unwrap();
        assert!(matches!(outcome, HealOutcome::NeedsFix { .. }));
        assert_eq!(outcome.output(), "bad things\n");
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(fs::read_to_string(&script).unwrap(), body);
        assert_eq!(fixer.backend().calls(), 0);
    }

    #[tokio::test]
    async fn interpreter_override_is_used_for_both_runs() {
        let dir = tempdir().unwrap();
        // No extension and no shebang: default would be python3
        let script = write_script(&dir, "task", "exit 1\n");
        let fixer = Fixer::new(ScriptedModel::answering("```sh\necho healed\n```"), FencePolicy::Lenient);

        let request = HealRequest {
            interpreter: Some("sh".to_string()),
            ..request_for(&script)
        };
        let outcome = run(&request, &fixer).await.unwrap();
        assert_eq!(outcome.output(), "healed\n");
    }

    #[tokio::test]
    async fn verification_that_cannot_start_still_reports_the_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        // Fails the first run and removes itself, so the second run cannot spawn
        let runner = write_script(&dir, "runner", "#!/bin/sh\nrm -f \"$0\"\nexit 1\n");
        fs::set_permissions(&runner, fs::Permissions::from_mode(0o755)).unwrap();
        let script = write_script(&dir, "task.sh", "exit 1\n");
        let fixer = Fixer::new(ScriptedModel::answering("```sh\ntrue\n```"), FencePolicy::Lenient);

        let request = HealRequest {
            interpreter: Some(runner.to_string_lossy().into_owned()),
            ..request_for(&script)
        };
        let err = run(&request, &fixer).await.unwrap_err();
        assert!(matches!(err, HealError::VerificationNotRun { .. }));
        assert!(err.file_modified());
        assert_eq!(fs::read_to_string(&script).unwrap(), "true");
        assert_eq!(fixer.backend().calls(), 1);
    }
}
