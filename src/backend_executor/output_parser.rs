//! Pull a JSON object out of model output
//!
//! Models are asked for bare JSON but regularly wrap it in a markdown fence
//! or surround it with a sentence or two.

use serde_json::Value;

/// Extract the first JSON object from `text`.
///
/// Tried in order: the whole text, a ```` ```json ```` fence, a bare fence,
/// then the first balanced `{...}` span that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(json @ Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(json);
    }

    extract_from_code_block(text, "json")
        .or_else(|| extract_from_code_block(text, ""))
        .or_else(|| find_object_in_text(text))
}

/// Extract a JSON object from a markdown code block
fn extract_from_code_block(text: &str, lang: &str) -> Option<Value> {
    let opener = format!("```{}", lang);
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(&opener) {
        let after_fence = search_from + found + opener.len();
        let rest = &text[after_fence..];

        // Bare fences must not swallow a language tag
        let body_start = match rest.find('\n') {
            Some(newline) if lang.is_empty() && !rest[..newline].trim().is_empty() => {
                search_from = after_fence;
                continue;
            }
            Some(newline) => newline + 1,
            None => return None,
        };

        let body = &rest[body_start..];
        let end = body.find("```")?;
        if let Ok(json @ Value::Object(_)) = serde_json::from_str(body[..end].trim()) {
            return Some(json);
        }
        search_from = after_fence + body_start + end + 3;
    }

    None
}

/// Find the first balanced JSON object embedded in prose
fn find_object_in_text(text: &str) -> Option<Value> {
    text.match_indices('{')
        .find_map(|(start, _)| balanced_span(&text[start..]))
        .and_then(|span| serde_json::from_str(span).ok())
}

/// Return the prefix of `text` (which starts with `{`) up to its matching `}`
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let span = &text[..=i];
                    return serde_json::from_str::<Value>(span).is_ok().then_some(span);
                }
            }
            _ => {}
        }
    }

    None
}
