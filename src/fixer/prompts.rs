use crate::executor::ScriptLanguage;

pub const FIX_SCRIPT_SYSTEM: &str = r#"You are a careful senior developer repairing a script that fails when run.
Return the complete corrected file in a single fenced code block.
Keep the original structure and behavior; change only what is needed for the script to run without errors."#;

/// Build the user message for a fix request. Source and error are embedded
/// verbatim; nothing is truncated.
pub fn build_fix_prompt(code: &str, error_message: &str, language: ScriptLanguage) -> String {
    let tag = language.fence_tags().first().copied().unwrap_or("");
    format!(
        "Fix this {name} code that has errors.\n\n\
         CODE:\n```{tag}\n{code}\n```\n\n\
         ERROR:\n{error}\n\n\
         Provide ONLY the corrected code without any explanations.\n",
        name = language.name(),
        tag = tag,
        code = code,
        error = error_message,
    )
}
