//! Structured value extraction from free-text judgment replies.
//!
//! Replies are tried in order:
//! 1. Fenced code blocks (```` ```json ```` or bare ```` ``` ````)
//! 2. The whole reply
//! 3. The first well-balanced `{...}` or `[...]` region
//!
//! Only objects and arrays count as structured values. Nothing here panics or
//! returns an error; an unusable reply yields `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Matches a fenced code block, optionally tagged `json`.
static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence regex")
});

/// Extract the first structured JSON value from `text`.
pub fn extract_structured(text: &str) -> Option<Value> {
    for caps in FENCE_RE.captures_iter(text) {
        if let Some(value) = parse_container(caps[1].trim()) {
            return Some(value);
        }
    }

    if let Some(value) = parse_container(text.trim()) {
        return Some(value);
    }

    first_balanced(text)
}

fn parse_container(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        _ => None,
    }
}

/// Outcome of scanning from one opening bracket.
enum Scan {
    /// Byte index of the matching closing bracket.
    Balanced(usize),
    /// Closing bracket of the wrong kind.
    Mismatched,
    /// Text ended with brackets still open.
    Unclosed,
}

fn first_balanced(text: &str) -> Option<Value> {
    for (start, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        match scan_from(text, start) {
            Scan::Balanced(end) => {
                if let Some(value) = parse_container(&text[start..=end]) {
                    return Some(value);
                }
            }
            Scan::Mismatched => {}
            // Everything after an unclosed bracket sits inside it.
            Scan::Unclosed => return None,
        }
    }
    None
}

fn scan_from(text: &str, start: usize) -> Scan {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return Scan::Mismatched;
                }
                if stack.is_empty() {
                    return Scan::Balanced(start + offset);
                }
            }
            _ => {}
        }
    }

    Scan::Unclosed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_array_from_prose_and_fence() {
        let reply = "Here are the bits you asked for:\n\n```json\n[\n  {\"source_item\": \"a\"},\n  {\"source_item\": \"b\"}\n]\n```\n\nLet me know if you want more.";
        let value = extract_structured(reply).expect("array");
        let items = value.as_array().expect("is array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["source_item"], "b");
    }

    #[test]
    fn extracts_from_untagged_fence() {
        let reply = "```\n{\"score\": 6}\n```";
        assert_eq!(extract_structured(reply).unwrap()["score"], 6);
    }

    #[test]
    fn whole_reply_is_json() {
        let value = extract_structured("  [1, 2, 3]\n").unwrap();
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[test]
    fn locates_object_inside_prose() {
        let reply = "My verdict: {\"passed\": true, \"total_score\": 8.5} as requested.";
        let value = extract_structured(reply).unwrap();
        assert_eq!(value["passed"], true);
    }

    #[test]
    fn brackets_inside_strings_do_not_count() {
        let reply = "Result -> {\"reason\": \"uses } and ] freely\", \"score\": 4} done";
        let value = extract_structured(reply).unwrap();
        assert_eq!(value["score"], 4);
        assert_eq!(value["reason"], "uses } and ] freely");
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let reply = r#"note {"reason": "he said \"no {way\"", "score": 2}"#;
        let value = extract_structured(reply).unwrap();
        assert_eq!(value["score"], 2);
    }

    #[test]
    fn unbalanced_brackets_yield_none() {
        let reply = "Here you go: [{\"a\": 1}, {\"b\": 2}";
        assert!(extract_structured(reply).is_none());
    }

    #[test]
    fn value_after_unclosed_opener_is_not_recovered() {
        let reply = r#"Verdict [draft follows: {"score": 7, "recommendation": "continue"}"#;
        assert!(extract_structured(reply).is_none());
    }

    #[test]
    fn unbalanced_inside_fence_yields_none() {
        let reply = "```json\n{\"score\": 7, \"reason\": \"cut off\n```";
        assert!(extract_structured(reply).is_none());
    }

    #[test]
    fn skips_invalid_balanced_region() {
        let reply = "[see below] {\"score\": 3}";
        let value = extract_structured(reply).unwrap();
        assert_eq!(value["score"], 3);
    }

    #[test]
    fn plain_text_and_scalars_yield_none() {
        assert!(extract_structured("no structured data here").is_none());
        assert!(extract_structured("42").is_none());
        assert!(extract_structured("").is_none());
    }

    #[test]
    fn multibyte_prose_is_handled() {
        let reply = "結果です：{\"score\": 9, \"reason\": \"面白い\"}";
        let value = extract_structured(reply).unwrap();
        assert_eq!(value["reason"], "面白い");
    }
}
