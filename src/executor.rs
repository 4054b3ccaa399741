//! Script execution
//!
//! Runs the target script once in a fresh process, captures its output and
//! classifies the run by exit code alone.

use crate::error::ExecutorError;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Result of running a script
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub succeeded: bool,
    /// stdout on success, stderr on failure
    pub output: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(output: String, exit_code: Option<i32>, duration_ms: u64) -> Self {
        Self {
            succeeded: true,
            output,
            exit_code,
            duration_ms,
        }
    }

    pub fn failure(output: String, exit_code: Option<i32>, duration_ms: u64) -> Self {
        Self {
            succeeded: false,
            output,
            exit_code,
            duration_ms,
        }
    }
}

/// Language of the target script, used for fence tags and prompt wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    Python,
    Shell,
    Bash,
    JavaScript,
    Ruby,
    Perl,
    Unknown,
}

impl ScriptLanguage {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptLanguage::Python => "Python",
            ScriptLanguage::Shell => "shell",
            ScriptLanguage::Bash => "Bash",
            ScriptLanguage::JavaScript => "JavaScript",
            ScriptLanguage::Ruby => "Ruby",
            ScriptLanguage::Perl => "Perl",
            ScriptLanguage::Unknown => "script",
        }
    }

    /// Info-string tags a model may put on the opening fence. The first one
    /// is used when showing code to the model.
    pub fn fence_tags(&self) -> &'static [&'static str] {
        match self {
            ScriptLanguage::Python => &["python", "py", "python3"],
            ScriptLanguage::Shell => &["sh", "shell", "bash"],
            ScriptLanguage::Bash => &["bash", "sh", "shell"],
            ScriptLanguage::JavaScript => &["javascript", "js", "node"],
            ScriptLanguage::Ruby => &["ruby", "rb"],
            ScriptLanguage::Perl => &["perl", "pl"],
            ScriptLanguage::Unknown => &[],
        }
    }

    fn default_program(&self) -> &'static str {
        match self {
            ScriptLanguage::Python | ScriptLanguage::Unknown => "python3",
            ScriptLanguage::Shell => "sh",
            ScriptLanguage::Bash => "bash",
            ScriptLanguage::JavaScript => "node",
            ScriptLanguage::Ruby => "ruby",
            ScriptLanguage::Perl => "perl",
        }
    }

    /// Detect language from the file extension
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") => ScriptLanguage::Python,
            Some("sh") => ScriptLanguage::Shell,
            Some("bash") => ScriptLanguage::Bash,
            Some("js") | Some("mjs") | Some("cjs") => ScriptLanguage::JavaScript,
            Some("rb") => ScriptLanguage::Ruby,
            Some("pl") => ScriptLanguage::Perl,
            _ => ScriptLanguage::Unknown,
        }
    }

    /// Detect language from an interpreter program name or path
    pub fn from_program(program: &str) -> Self {
        let base = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program);
        if base.starts_with("python") {
            ScriptLanguage::Python
        } else if base == "bash" {
            ScriptLanguage::Bash
        } else if matches!(base, "sh" | "dash" | "zsh" | "ksh") {
            ScriptLanguage::Shell
        } else if base.starts_with("node") {
            ScriptLanguage::JavaScript
        } else if base.starts_with("ruby") {
            ScriptLanguage::Ruby
        } else if base.starts_with("perl") {
            ScriptLanguage::Perl
        } else {
            ScriptLanguage::Unknown
        }
    }
}

/// The program (and leading arguments) a script is handed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    pub language: ScriptLanguage,
}

impl Interpreter {
    /// Display form, e.g. `python3 -u`
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Pick the interpreter for a script: explicit override, then the `#!` line,
/// then the extension default.
pub fn resolve_interpreter(path: &Path, content: &str, override_program: Option<&str>) -> Interpreter {
    let ext_language = ScriptLanguage::from_extension(path);

    if let Some(program) = override_program {
        let mut parts = program.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| program.to_string());
        let language = match ext_language {
            ScriptLanguage::Unknown => ScriptLanguage::from_program(&program),
            known => known,
        };
        return Interpreter {
            program,
            args: parts.collect(),
            language,
        };
    }

    if let Some((program, args)) = parse_shebang(content) {
        let language = match ext_language {
            ScriptLanguage::Unknown => ScriptLanguage::from_program(&program),
            known => known,
        };
        return Interpreter {
            program,
            args,
            language,
        };
    }

    let language = match ext_language {
        ScriptLanguage::Unknown => ScriptLanguage::Python,
        known => known,
    };
    Interpreter {
        program: language.default_program().to_string(),
        args: Vec::new(),
        language,
    }
}

/// Parse `#!/usr/bin/env [-S] prog args` or `#!/path/prog args`
fn parse_shebang(content: &str) -> Option<(String, Vec<String>)> {
    let first = content.lines().next()?;
    let rest = first.strip_prefix("#!")?.trim();
    let mut words = rest.split_whitespace();
    let head = words.next()?;

    let is_env = Path::new(head).file_name().and_then(|n| n.to_str()) == Some("env");
    if is_env {
        let mut words = words.skip_while(|w| w.starts_with('-'));
        let program = words.next()?;
        return Some((program.to_string(), words.map(str::to_string).collect()));
    }

    Some((head.to_string(), words.map(str::to_string).collect()))
}

/// Run the script in a fresh process and wait for it to exit.
///
/// No timeout: a script that never exits blocks the run.
pub async fn execute(path: &Path, interpreter: &Interpreter) -> Result<ExecutionResult, ExecutorError> {
    tracing::debug!(
        script = %path.display(),
        interpreter = %interpreter.command_line(),
        "Attempting to run script"
    );
    let start = Instant::now();

    let output = Command::new(&interpreter.program)
        .args(&interpreter.args)
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ExecutorError {
            interpreter: interpreter.command_line(),
            script: path.to_path_buf(),
            source,
        })?;

    let duration_ms = elapsed_ms(start);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code();

    tracing::debug!(?exit_code, duration_ms, "Script execution finished");
    if !stderr.is_empty() {
        tracing::debug!("Script stderr: {}", stderr);
    }
    if !stdout.is_empty() {
        tracing::debug!("Script stdout: {}", stdout);
    }

    if output.status.success() {
        Ok(ExecutionResult::success(stdout, exit_code, duration_ms))
    } else {
        Ok(ExecutionResult::failure(stderr, exit_code, duration_ms))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
