//! Cleanup and repair of generated model output.
//!
//! Models wrap JSON in code fences, prepend prose, or get cut off mid-object
//! when they hit the output limit. [`parse_generated`] strips the wrapping,
//! slices out the object span, and makes one structural repair attempt before
//! giving up.

use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";

/// Generated text that could not be turned into a JSON object.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("no JSON object found in generated output")]
    NoObject,
    #[error("generated JSON is malformed after repair: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("generated JSON is not an object")]
    NotAnObject,
}

/// Strip fences, slice the object span, and return the candidate JSON text.
pub fn sanitize(raw: &str) -> String {
    let unfenced = strip_fences(raw);
    extract_object_span(&unfenced).unwrap_or(unfenced.trim()).to_string()
}

/// Full pipeline: [`sanitize`], parse, and on failure repair then parse again.
pub fn parse_generated(raw: &str) -> Result<Value, SanitizeError> {
    let candidate = sanitize(raw);
    if !candidate.starts_with('{') {
        return Err(SanitizeError::NoObject);
    }

    let value = match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => value,
        Err(first) => {
            tracing::debug!(error = %first, "generated JSON did not parse, attempting repair");
            let repaired = repair_truncated(&candidate);
            serde_json::from_str::<Value>(&repaired).map_err(SanitizeError::Malformed)?
        }
    };

    if value.is_object() {
        Ok(value)
    } else {
        Err(SanitizeError::NotAnObject)
    }
}

/// Remove triple-backtick fences and an optional `json` language tag after
/// the opening fence. Case-insensitive.
pub fn strip_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find(FENCE) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + FENCE.len()..];
        if rest
            .get(..4)
            .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
        {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out
}

/// Slice from the first `{` to the last `}`. A truncated object with no
/// closing brace is kept from its first `{` to the end.
pub fn extract_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(text[start..].trim_end()),
    }
}

/// Close whatever a truncated generation left open.
///
/// Scans the text outside string literals, tracking unclosed `{` and `[`.
/// Trailing commas and dangling quotes are trimmed, an unterminated string
/// gets its closing quote, and missing closers are appended innermost first.
pub fn repair_truncated(text: &str) -> String {
    let mut repaired = text.trim_end().to_string();

    let scan = scan_structure(&repaired);
    if scan.open.is_empty() && !scan.in_string {
        return repaired;
    }

    if !scan.in_string || ends_with_dangling_key_quote(&repaired) {
        trim_dangling(&mut repaired);
    }

    let scan = scan_structure(&repaired);
    if scan.in_string {
        repaired.push('"');
    }
    for opener in scan.open.iter().rev() {
        repaired.push(if *opener == '{' { '}' } else { ']' });
    }
    repaired
}

struct Structure {
    open: Vec<char>,
    in_string: bool,
}

fn scan_structure(text: &str) -> Structure {
    let mut open = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => open.push(c),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    Structure { open, in_string }
}

fn trim_dangling(text: &mut String) {
    loop {
        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);
        match text.chars().last() {
            Some(',') => {
                text.pop();
            }
            Some('"') if ends_with_dangling_key_quote(text) => {
                text.pop();
            }
            _ => break,
        }
    }
}

/// A lone opening quote of a key that never got written.
fn ends_with_dangling_key_quote(text: &str) -> bool {
    let Some(before) = text.strip_suffix('"') else {
        return false;
    };
    let before = before.trim_end();
    before.ends_with(',') || before.ends_with('{')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_case_insensitively() {
        let raw = "```JSON\n{\"type\":\"CHAT\"}\n```";
        assert_eq!(strip_fences(raw).trim(), "{\"type\":\"CHAT\"}");
    }

    #[test]
    fn slices_prose_wrapper() {
        let raw = "Sure! Here you go: {\"a\": 1} hope that helps";
        assert_eq!(sanitize(raw), "{\"a\": 1}");
    }

    #[test]
    fn parses_clean_object() {
        let value = parse_generated("{\"type\": \"CHAT\"}").unwrap();
        assert_eq!(value["type"], "CHAT");
    }

    #[test]
    fn repairs_missing_closing_braces() {
        let raw = "{\"type\": \"TRANSACTION\", \"data\": {\"action_type\": \"TRANSFER\", \"params\": {\"amount\": \"10\"";
        let value = parse_generated(raw).unwrap();
        assert_eq!(value["data"]["params"]["amount"], "10");
    }

    #[test]
    fn repairs_trailing_comma() {
        let raw = "{\"type\": \"CHAT\", \"summary\": \"hi\",";
        let value = parse_generated(raw).unwrap();
        assert_eq!(value["summary"], "hi");
    }

    #[test]
    fn repairs_unterminated_string() {
        let raw = "```json\n{\"type\": \"CHAT\", \"summary\": \"half a sente";
        let value = parse_generated(raw).unwrap();
        assert_eq!(value["summary"], "half a sente");
    }

    #[test]
    fn repairs_open_array() {
        let raw = "{\"data\": {\"params\": {\"recipients\": [\"0x1\", \"0x2\"";
        let value = parse_generated(raw).unwrap();
        assert_eq!(value["data"]["params"]["recipients"][1], "0x2");
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let raw = "{\"summary\": \"use {curly} braces\", \"type\": \"CHAT\"}";
        let value = parse_generated(raw).unwrap();
        assert_eq!(value["summary"], "use {curly} braces");

        let truncated = "{\"type\": \"CHAT\", \"summary\": \"a { b\"";
        let value = parse_generated(truncated).unwrap();
        assert_eq!(value["summary"], "a { b");
    }

    #[test]
    fn dangling_key_quote_is_trimmed() {
        let value = parse_generated("{\"type\": \"CHAT\", \"").unwrap();
        assert_eq!(value["type"], "CHAT");
    }

    #[test]
    fn empty_and_prose_only_fail() {
        assert!(matches!(parse_generated(""), Err(SanitizeError::NoObject)));
        assert!(matches!(
            parse_generated("I cannot help with that."),
            Err(SanitizeError::NoObject)
        ));
    }

    #[test]
    fn unrepairable_fails_without_panicking() {
        assert!(parse_generated("{\"type\": }}}").is_err());
    }
}
