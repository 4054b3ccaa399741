use crate::error::RemoteServiceError;

const FENCE: &str = "```";

/// What to do when a response carries no fenced code block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FencePolicy {
    /// Use the whole response verbatim
    #[default]
    Lenient,
    /// Reject the response
    Strict,
}

/// Replacement source pulled out of a model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFix {
    pub code: String,
    /// false when the whole response was taken verbatim
    pub from_fence: bool,
}

/// Turn raw model output into replacement source according to `policy`.
pub fn extract_fix(
    response: &str,
    tags: &[&str],
    policy: FencePolicy,
) -> Result<ExtractedFix, RemoteServiceError> {
    if let Some(code) = extract_fenced_code(response, tags) {
        return Ok(ExtractedFix {
            code,
            from_fence: true,
        });
    }

    match policy {
        FencePolicy::Lenient => Ok(ExtractedFix {
            code: response.to_string(),
            from_fence: false,
        }),
        FencePolicy::Strict => Err(RemoteServiceError::MissingCodeBlock),
    }
}

/// Extract the body of a fenced code block, trimmed.
///
/// A fence tagged with one of `tags` is preferred; otherwise the first fence
/// of any kind is used. An opening fence with no closing fence after it
/// does not count.
pub fn extract_fenced_code(text: &str, tags: &[&str]) -> Option<String> {
    let fences = opening_fences(text);

    let tagged = fences.iter().find(|fence| {
        fence
            .tag
            .as_deref()
            .is_some_and(|tag| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
    });

    tagged
        .into_iter()
        .chain(fences.iter())
        .find_map(|fence| block_body(text, fence.body_start))
}

struct OpeningFence {
    tag: Option<String>,
    /// Byte offset of the first line after the fence
    body_start: usize,
}

/// Opening fences in `text`. Outside a block, a fence may open anywhere on a
/// line (`Here is the fix: ```python`); the rest of that line is the info
/// string. Inside a block only a bare fence line closes it.
fn opening_fences(text: &str) -> Vec<OpeningFence> {
    let mut fences = Vec::new();
    let mut offset = 0;
    let mut inside = false;

    for line in text.split_inclusive('\n') {
        offset += line.len();

        if inside {
            if line.trim() == FENCE {
                inside = false;
            }
            continue;
        }

        let Some(marker) = line.find(FENCE) else {
            continue;
        };
        let info = line[marker + FENCE.len()..].trim();

        // An inline span (```code```) or a fence on the last line opens nothing
        if info.contains(FENCE) || !line.ends_with('\n') {
            continue;
        }
        let tag = info
            .split_whitespace()
            .next()
            .map(|t| t.trim_matches(|c: char| c == '{' || c == '}' || c == '.'))
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        fences.push(OpeningFence {
            tag,
            body_start: offset,
        });
        inside = true;
    }

    fences
}

/// Text between `body_start` and the closing fence. The closing fence is the
/// first line holding only a bare fence; failing that, the last fence marker
/// anywhere after the body starts.
fn block_body(text: &str, body_start: usize) -> Option<String> {
    let rest = &text[body_start..];

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim() == FENCE {
            return Some(rest[..offset].trim().to_string());
        }
        offset += line.len();
    }

    let end = rest.rfind(FENCE)?;
    Some(rest[..end].trim().to_string())
}
