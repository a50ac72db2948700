//! Rule-based relevance classifier.
//!
//! Tiers: 1 = high signal (market-moving), 2 = standard crypto news,
//! 3 = noise (speculation, listicles, off-topic). Source identity is
//! deliberately not a ranking input — source tiers belong to selective
//! processing, not relevance.

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Non-crypto topics that show up in crypto RSS feeds (gaming spillover).
const NON_CRYPTO_PATTERNS: &[&str] = &[
    r"\bgames?\s+releasing\b",
    r"\bgames?\s+of\s+\d{4}\b",
    r"\bmost\s+anticipated\s+games\b",
    r"\bnintendo\s+switch\b",
    r"\bplaystation\b",
    r"\bxbox\b",
    r"\bsteam\s+deck\b",
];

/// Pure stock-market stories. Only tier 3 when the title lacks crypto
/// context (checked separately; the regex crate has no lookaround).
const STOCK_PATTERNS: &[&str] = &[
    r"\b(aapl|googl|tsla|nvda)\b",
    r"\bstock\s+prediction\b",
    r"\bearnings\s+miss\b",
    r"\bsold\s+(nvda|tsla|aapl|googl)\b",
];

const CRYPTO_CONTEXT_PATTERN: &str =
    r"\b(bitcoin|btc|crypto|blockchain|token|coin|mining|coinbase)\b";

/// Speculation and crystal-ball content.
const SPECULATION_PATTERNS: &[&str] = &[
    r"\bcrystal\s+ball\b",
    r"\bwill\s+\w+\s+finally\b",
    r"\bcould\s+.{0,40}(launch|spark|trigger|send|push)\b.*\brally\b",
    r"\bis\s+it\s+entering\s+a\s+recovery\b",
    r"\bunstoppable\?\s*$",
    r"\bgo(ing)?\s+parabolic\b",
    r"\bto\s+the\s+moon\b",
    r"\bwhat'?s?\s+a\s+\$?\d+\s+investment\b",
    r"\bhow\s+many\s+coins?\s+need\s+to\s+be\s+burned\b",
    r"\bai\s+chatbots?\s+(offer|predict|say)\b",
    r"\bcould\s+.{0,30}\d+%\s+rally\b",
];

/// Routine price-prediction content.
const PRICE_PREDICTION_PATTERNS: &[&str] = &[
    r"^price\s+predictions?\s+\d+/\d+",
    r"\bprice\s+prediction\s+\d{4}\b",
    r"\b(btc|eth|xrp|sol|doge)\s+to\s+hit\s+\$[\d,]+\b",
    r"\bcould\s+reach\s+\$[\d,]+\b",
    r"\btarget\s+of\s+\$[\d,]+\b",
    r"\bprice\s+levels?\s+to\s+watch\b",
];

/// Retrospectives and listicles.
const RETROSPECTIVE_PATTERNS: &[&str] = &[
    r"\bwtf\s+moments?\s+of\s+(the\s+)?year\b",
    r"\bstories\s+that\s+shook\b",
    r"\bbest\s+of\s+\d{4}\b",
    r"\btop\s+\d+\s+moments?\s+of\b",
    r"\byear\s+in\s+review\b",
];

/// Regulatory and legal (market-moving).
const REGULATORY_PATTERNS: &[&str] = &[
    r"\bsec\b",
    r"\bcftc\b",
    r"\bdoj\b",
    r"\bfbi\b",
    r"\bcommissioner\b",
    r"\bregulat(or|ory|ion)\b",
    r"\blegaliz(e|es|ed|ation)\b",
    r"\bban(s|ned|ning)?\b.*\bcrypto\b",
    r"\bcrypto\b.*\bban(s|ned|ning)?\b",
    r"\blegislat(ion|ive)\b",
    r"\bbill\s+(pass|propos|approv)\b",
    r"\bexecutive\s+order\b",
    r"\btax\s+(framework|ruling|guidance)\b",
];

/// Security incidents (urgent).
const SECURITY_PATTERNS: &[&str] = &[
    r"\bhack(ed|ing|s)?\b",
    r"\bexploit(ed|s)?\b",
    r"\bdrain(ed|ing|s)?\b",
    r"\bstolen\b",
    r"\bbreach(ed|es)?\b",
    r"\bvulnerability\b",
    r"\battack(ed|er|s)?\b",
    r"\brug\s*pull\b",
    r"\bscam\b.*\b(million|billion)\b",
];

/// Historical/follow-up security stories demote back to tier 2.
const HISTORICAL_SECURITY_PATTERNS: &[&str] = &[
    r"\bhacker\b.{0,30}\b(released|sentenced|arrested|prison|jail|plea|guilty|charged)\b",
    r"\b(released|sentenced|arrested)\b.{0,30}\bhacker\b",
    r"\bhack(er)?\b.{0,20}\bcredits?\b",
];

/// Hard market data with dollar figures.
const MARKET_DATA_PATTERNS: &[&str] = &[
    r"\bliquidat(ed|ion|ions)\b.*\$\d+",
    r"\$\d+\s*(million|billion|m|b)\s+(in\s+)?(liquidat|outflow|inflow)",
    r"\betf\s+(in|out)flow",
    r"\b(in|out)flow(s)?\b.*\betf\b",
    r"\betf[s]?\s+(lose|lost|gain)\b.*\b(billion|million)\b",
    r"\b(billion|million)\b.*\betf\b",
    r"\ball[- ]time\s+high\b",
    r"\bath\b",
    r"\brecord\s+(high|low|volume|outflow|inflow)\b",
    r"\bmarket\s+cap\b.*\b(trillion|billion)\b",
    r"\$\d+\s*(billion|trillion)\b.{0,30}\b(left|exit|fled|flow|move)\b",
    r"\b(billion|trillion)\b.{0,20}\b(left|exit|fled)\b",
];

/// Major institutional and corporate moves.
const INSTITUTIONAL_PATTERNS: &[&str] = &[
    r"\b(bought|buys?|purchase[ds]?|acquir)\b.*\b(bitcoin|btc|eth)\b",
    r"\b(bitcoin|btc|eth)\b.*\b(bought|buys?|purchase[ds]?|acquir)\b",
    r"\bipo\b",
    r"\bacquisition\b",
    r"\bpartnership\b.*\b(announc|sign|form)\b",
    r"\b(blackrock|fidelity|vanguard|jpmorgan|goldman)\b",
    r"\btreasury\b.*\b(bitcoin|btc|strategy)\b",
];

/// Country-level adoption.
const ADOPTION_PATTERNS: &[&str] = &[
    r"\b(country|nation|government)\b.*\b(adopt|accept|legalize)\b",
    r"\b(adopt|accept|legalize)\b.*\b(country|nation|government)\b",
    r"\blegal\s+tender\b",
    r"\bcentral\s+bank\s+digital\b",
    r"\bcbdc\b",
    r"\bde-?dollarization\b",
];

/// Body text prefix checked for tier-1 patterns when the title is neutral.
const BODY_CHECK_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tier: i32,
    pub reason: &'static str,
    pub matched_pattern: Option<String>,
}

pub struct RelevanceClassifier {
    tier3: Vec<Regex>,
    tier3_stock: Vec<Regex>,
    crypto_context: Regex,
    tier1: Vec<Regex>,
    tier1_exceptions: Vec<Regex>,
}

impl Default for RelevanceClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceClassifier {
    pub fn new() -> Self {
        let tier3 = compile_group(&[
            NON_CRYPTO_PATTERNS,
            SPECULATION_PATTERNS,
            PRICE_PREDICTION_PATTERNS,
            RETROSPECTIVE_PATTERNS,
        ]);
        let tier1 = compile_group(&[
            REGULATORY_PATTERNS,
            SECURITY_PATTERNS,
            MARKET_DATA_PATTERNS,
            INSTITUTIONAL_PATTERNS,
            ADOPTION_PATTERNS,
        ]);

        Self {
            tier3,
            tier3_stock: compile_group(&[STOCK_PATTERNS]),
            crypto_context: compile(CRYPTO_CONTEXT_PATTERN)
                .expect("crypto context pattern is valid"),
            tier1,
            tier1_exceptions: compile_group(&[HISTORICAL_SECURITY_PATTERNS]),
        }
    }

    /// Classify an article. The title is the primary signal; the body is a
    /// weaker secondary check for tier 1. `source` is accepted for parity
    /// with callers but never used in scoring.
    pub fn classify(&self, title: &str, text: Option<&str>, _source: Option<&str>) -> Classification {
        let title_lower = title.to_lowercase();

        if let Some(pattern) = matches_any(&title_lower, &self.tier3) {
            return Classification {
                tier: 3,
                reason: "low_signal",
                matched_pattern: Some(pattern),
            };
        }

        // Stock stories are tier 3 only without crypto context in the title.
        if !self.crypto_context.is_match(&title_lower) {
            if let Some(pattern) = matches_any(&title_lower, &self.tier3_stock) {
                return Classification {
                    tier: 3,
                    reason: "low_signal",
                    matched_pattern: Some(pattern),
                };
            }
        }

        if let Some(pattern) = matches_any(&title_lower, &self.tier1) {
            if matches_any(&title_lower, &self.tier1_exceptions).is_some() {
                return Classification {
                    tier: 2,
                    reason: "historical_security",
                    matched_pattern: Some(pattern),
                };
            }
            return Classification {
                tier: 1,
                reason: "high_signal_title",
                matched_pattern: Some(pattern),
            };
        }

        if let Some(text) = text {
            let preview: String = text.chars().take(BODY_CHECK_CHARS).collect::<String>().to_lowercase();
            if let Some(pattern) = matches_any(&preview, &self.tier1) {
                return Classification {
                    tier: 1,
                    reason: "high_signal_body",
                    matched_pattern: Some(pattern),
                };
            }
        }

        Classification {
            tier: 2,
            reason: "default",
            matched_pattern: None,
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "invalid relevance pattern");
            None
        }
    }
}

fn compile_group(groups: &[&[&str]]) -> Vec<Regex> {
    groups
        .iter()
        .flat_map(|patterns| patterns.iter())
        .filter_map(|p| compile(p))
        .collect()
}

fn matches_any(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .find(|p| p.is_match(text))
        .map(|p| p.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RelevanceClassifier {
        RelevanceClassifier::new()
    }

    #[test]
    fn regulatory_title_is_tier_one() {
        let c = classifier().classify("SEC files lawsuit against major exchange", None, None);
        assert_eq!(c.tier, 1);
        assert_eq!(c.reason, "high_signal_title");
        assert!(c.matched_pattern.is_some());
    }

    #[test]
    fn security_incident_is_tier_one() {
        let c = classifier().classify("DeFi protocol hacked for $120 million", None, None);
        assert_eq!(c.tier, 1);
    }

    #[test]
    fn historical_security_story_demotes_to_tier_two() {
        let c = classifier().classify(
            "Exchange hacked in 2022: hacker sentenced to five years",
            None,
            None,
        );
        assert_eq!(c.tier, 2);
        assert_eq!(c.reason, "historical_security");
    }

    #[test]
    fn price_prediction_listicle_is_tier_three() {
        let c = classifier().classify("Price predictions 1/2: BTC, ETH, XRP", None, None);
        assert_eq!(c.tier, 3);
        assert_eq!(c.reason, "low_signal");
    }

    #[test]
    fn speculation_is_tier_three() {
        let c = classifier().classify("Is Dogecoin unstoppable?", None, None);
        assert_eq!(c.tier, 3);
    }

    #[test]
    fn gaming_spillover_is_tier_three() {
        let c = classifier().classify("Most anticipated games of 2026 revealed", None, None);
        assert_eq!(c.tier, 3);
    }

    #[test]
    fn stock_story_without_crypto_context_is_tier_three() {
        let c = classifier().classify("Why I sold NVDA before the earnings miss", None, None);
        assert_eq!(c.tier, 3);
    }

    #[test]
    fn stock_mention_with_crypto_context_survives() {
        let c = classifier().classify("NVDA supplier starts accepting Bitcoin", None, None);
        assert_ne!(c.tier, 3);
    }

    #[test]
    fn tier_one_body_match_when_title_is_neutral() {
        let c = classifier().classify(
            "Weekly digest: what happened in crypto",
            Some("The SEC announced a new enforcement framework this week..."),
            None,
        );
        assert_eq!(c.tier, 1);
        assert_eq!(c.reason, "high_signal_body");
    }

    #[test]
    fn neutral_title_defaults_to_tier_two() {
        let c = classifier().classify("New wallet app adds multi-chain support", None, None);
        assert_eq!(c.tier, 2);
        assert_eq!(c.reason, "default");
        assert!(c.matched_pattern.is_none());
    }

    #[test]
    fn tier_three_wins_over_tier_one() {
        // Speculation phrasing beats the regulatory keyword inside it.
        let c = classifier().classify(
            "Crystal ball: will SEC approval send prices to the moon?",
            None,
            None,
        );
        assert_eq!(c.tier, 3);
    }
}
