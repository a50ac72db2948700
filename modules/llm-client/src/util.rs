/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a response.
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Clean an LLM response for JSON decoding.
///
/// Models routinely wrap JSON in markdown fences and emit raw control
/// characters (newlines, tabs) inside string values, which breaks strict
/// JSON parsing. Fences are stripped, control characters become spaces, and
/// runs of whitespace collapse to a single space.
pub fn sanitize_json_response(response: &str) -> String {
    let stripped = strip_code_fences(response);

    let mut out = String::with_capacity(stripped.len());
    let mut prev_space = false;
    for c in stripped.chars() {
        let c = if c.is_control() { ' ' } else { c };
        if c == ' ' {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
        assert_eq!(truncate_to_char_boundary("Hello", 100), "Hello");
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
    }

    #[test]
    fn sanitize_removes_embedded_control_characters() {
        let raw = "```json\n{\"summary\": \"line one\nline two\ttabbed\"}\n```";
        let cleaned = sanitize_json_response(raw);
        assert_eq!(cleaned, "{\"summary\": \"line one line two tabbed\"}");
        let parsed: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(parsed["summary"], "line one line two tabbed");
    }

    #[test]
    fn sanitize_collapses_whitespace_runs() {
        assert_eq!(
            sanitize_json_response("{\"a\":   \"b\r\n\r\nc\"}"),
            "{\"a\": \"b c\"}"
        );
    }
}
