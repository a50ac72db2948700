use serde::de::DeserializeOwned;
use tracing::warn;

use llm_client::sanitize_json_response;

/// Decode a model response as JSON, tolerating markdown fences and embedded
/// control characters. Returns None (and logs at warn) when the cleaned text
/// still fails to decode — callers substitute a structured empty result and
/// skip caching.
pub fn parse_json_lenient<T: DeserializeOwned>(response: &str) -> Option<T> {
    let cleaned = sanitize_json_response(response);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            let preview: String = cleaned.chars().take(200).collect();
            warn!(error = %e, preview, "failed to parse LLM JSON response");
            None
        }
    }
}

/// Pull the first signed decimal out of free-form model output. Sentiment
/// and relevance prompts ask for a bare number but models editorialize.
pub fn parse_leading_number(response: &str) -> Option<f64> {
    let text = response.trim();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() || c == '-' || c == '+' {
            start = Some(i);
            break;
        }
    }
    let start = start?;
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());

    rest[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        title: String,
    }

    #[test]
    fn parses_fenced_json() {
        let parsed: Sample = parse_json_lenient("```json\n{\"title\": \"ok\"}\n```").unwrap();
        assert_eq!(parsed.title, "ok");
    }

    #[test]
    fn parses_json_with_control_characters_in_strings() {
        let parsed: Sample =
            parse_json_lenient("{\"title\": \"first\nsecond\tthird\"}").unwrap();
        assert_eq!(parsed.title, "first second third");
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_json_lenient::<Sample>("I could not produce JSON, sorry.").is_none());
    }

    #[test]
    fn leading_number_extraction() {
        assert_eq!(parse_leading_number("0.75"), Some(0.75));
        assert_eq!(parse_leading_number("-0.4 (bearish)"), Some(-0.4));
        assert_eq!(parse_leading_number("Sentiment: 0.9"), Some(0.9));
        assert_eq!(parse_leading_number("no numbers here"), None);
    }
}
