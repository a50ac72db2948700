//! Keyword extraction for enriched articles: frequency-ranked tokens with
//! canonical casing, topped up with LLM themes.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

pub const MAX_KEYWORDS: usize = 10;

/// Connective words plus terms so common in crypto feeds they carry no
/// signal.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "have", "will", "into", "been",
    "after", "their", "about", "there", "would", "could", "should", "while", "where",
    "which", "among", "using", "against", "across", "still", "other", "between", "taking",
    "because", "until", "during", "under", "whose", "however", "today", "yesterday",
    "tomorrow", "news", "crypto", "cryptocurrency", "market", "markets", "price",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b[A-Za-z][A-Za-z0-9\-\$]{2,}\b").expect("token pattern is valid")
    })
}

/// Tokens >= 3 chars, minus stopwords and pure digit runs, with `$`/`#`
/// sigils stripped.
pub fn tokenize(text: &str) -> Vec<String> {
    token_pattern()
        .find_iter(text)
        .filter_map(|m| {
            let token = m.as_str();
            let lowered = token.to_lowercase();
            if STOPWORDS.contains(&lowered.as_str()) {
                return None;
            }
            if lowered.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some(token.trim_matches(|c| c == '$' || c == '#').to_string())
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Top keywords by frequency (ties break alphabetically, case-insensitive).
/// All-caps tokens keep their casing; everything else is capitalized.
pub fn select_keywords(tokens: &[String]) -> Vec<String> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase())));

    let mut keywords = Vec::new();
    for (word, _) in ranked {
        let normalized = canonical_casing(word);
        if !keywords.contains(&normalized) {
            keywords.push(normalized);
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Append theme strings to the keyword list up to the cap, skipping
/// duplicates.
pub fn merge_themes(keywords: &mut Vec<String>, themes: &[String]) {
    for theme in themes {
        let trimmed = theme.trim();
        if trimmed.is_empty() {
            continue;
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        if !keywords.iter().any(|k| k == trimmed) {
            keywords.push(trimmed.to_string());
        }
    }
}

fn canonical_casing(word: &str) -> String {
    if word.chars().all(|c| !c.is_ascii_lowercase()) {
        return word.to_string();
    }
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_filters_stopwords_and_digits() {
        let tokens = tokenize("The SEC and Binance clashed after the 2024 filing");
        assert!(tokens.contains(&"SEC".to_string()));
        assert!(tokens.contains(&"Binance".to_string()));
        assert!(!tokens.iter().any(|t| t.to_lowercase() == "the"));
        assert!(!tokens.contains(&"2024".to_string()));
    }

    #[test]
    fn tokenize_strips_ticker_sigils() {
        let tokens = tokenize("$SOL and $BTC are moving");
        assert!(tokens.contains(&"SOL".to_string()));
        assert!(tokens.contains(&"BTC".to_string()));
    }

    #[test]
    fn keywords_rank_by_frequency_then_alphabetically() {
        let tokens: Vec<String> = ["bitcoin", "bitcoin", "etf", "etf", "solana"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let keywords = select_keywords(&tokens);
        // Both have count 2; "bitcoin" sorts before "etf".
        assert_eq!(keywords[0], "Bitcoin");
        assert_eq!(keywords[1], "Etf");
        assert_eq!(keywords[2], "Solana");
    }

    #[test]
    fn all_caps_tokens_keep_casing() {
        let tokens: Vec<String> = ["SEC", "SEC", "binance"].iter().map(|s| s.to_string()).collect();
        let keywords = select_keywords(&tokens);
        assert_eq!(keywords[0], "SEC");
        assert_eq!(keywords[1], "Binance");
    }

    #[test]
    fn keyword_list_caps_at_ten() {
        let tokens: Vec<String> = (0..30).map(|i| format!("token{i:02}")).collect();
        assert_eq!(select_keywords(&tokens).len(), MAX_KEYWORDS);
    }

    #[test]
    fn themes_merge_without_duplicates_up_to_cap() {
        let mut keywords = vec!["Bitcoin".to_string()];
        merge_themes(
            &mut keywords,
            &["Regulation".to_string(), "Bitcoin".to_string(), " ".to_string()],
        );
        assert_eq!(keywords, vec!["Bitcoin".to_string(), "Regulation".to_string()]);
    }
}
