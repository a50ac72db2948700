//! Selective processing: route each article to LLM or rule-based entity
//! extraction. Premium sources always pay for the LLM, low-value sources
//! never do, and the middle tier qualifies on important title keywords —
//! landing the effective LLM share around half of all articles.

use std::collections::HashMap;

use anyhow::Result;
use regex::RegexBuilder;
use uuid::Uuid;

use chainpulse_common::{crypto_entities, Article, ArticleEntity, SentimentLabel};
use chainpulse_llm::{EntityExtractionInput, LlmGateway};

/// Sources whose articles always get LLM extraction.
const PREMIUM_SOURCES: &[&str] = &[
    "coindesk",
    "cointelegraph",
    "decrypt",
    "theblock",
    "bloomberg",
    "reuters",
    "cnbc",
];

/// Sources that never get LLM extraction.
const SKIP_LLM_SOURCES: &[&str] = &["bitcoinmagazine", "cryptoslate", "cryptopotato", "newsbtc"];

/// Title keywords that qualify a mid-tier article for the LLM.
const IMPORTANT_KEYWORDS: &[&str] = &[
    // Major cryptos
    "bitcoin", "btc", "ethereum", "eth", "solana", "sol",
    // Regulation & legal
    "sec", "regulation", "lawsuit", "ban", "cftc", "law",
    // Security events
    "hack", "hacked", "exploit", "breach", "vulnerability",
    // Market movements
    "crash", "surge", "plunge", "soar", "rally", "dump",
    "all-time high", "ath", "record", "milestone",
    // Institutional
    "institutional", "etf", "approval", "wall street",
    // Technology
    "fork", "upgrade", "launch", "mainnet", "testnet",
    // Business
    "partnership", "acquisition", "merger", "investment",
    "bankruptcy", "collapse", "liquidation",
];

const TITLE_MATCH_CONFIDENCE: f64 = 0.85;
const BODY_MATCH_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Llm,
    RuleBased,
}

/// Per-article extraction outcome, ready for article update + mention
/// persistence.
#[derive(Debug, Clone)]
pub struct ArticleExtraction {
    pub article_id: Uuid,
    pub method: ExtractionMethod,
    pub entities: Vec<ArticleEntity>,
    /// Entity-level sentiment from the LLM, when it offered one.
    pub sentiment: Option<SentimentLabel>,
}

pub struct SelectiveProcessor {
    entity_patterns: Vec<(&'static str, regex::Regex)>,
}

impl Default for SelectiveProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectiveProcessor {
    pub fn new() -> Self {
        let entity_patterns = crypto_entities()
            .map(|(canonical, variants)| {
                let alternation = variants
                    .iter()
                    .map(|v| regex::escape(v))
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = RegexBuilder::new(&format!(r"\b({alternation})\b"))
                    .case_insensitive(true)
                    .build()
                    .expect("entity variant patterns are valid");
                (canonical, pattern)
            })
            .collect();

        Self { entity_patterns }
    }

    /// Decision tree: premium source -> LLM; skip source -> rules;
    /// otherwise LLM iff the title carries an important keyword.
    pub fn should_use_llm(&self, source: &str, title: &str) -> bool {
        let source = source.to_lowercase();
        if PREMIUM_SOURCES.contains(&source.as_str()) {
            return true;
        }
        if SKIP_LLM_SOURCES.contains(&source.as_str()) {
            return false;
        }

        let title = title.to_lowercase();
        IMPORTANT_KEYWORDS.iter().any(|k| title.contains(k))
    }

    /// Regex extraction against the canonical entity map. The first
    /// canonical found in the title is primary at 0.85; everything else
    /// found in the body is context at 0.7.
    pub fn extract_rule_based(&self, title: &str, text: &str) -> Vec<ArticleEntity> {
        let combined = format!("{title} {text}");

        let mut entities: Vec<ArticleEntity> = Vec::new();
        for (canonical, pattern) in &self.entity_patterns {
            if pattern.is_match(&combined) {
                entities.push(ArticleEntity {
                    name: canonical.to_string(),
                    entity_type: "cryptocurrency".to_string(),
                    ticker: None,
                    confidence: BODY_MATCH_CONFIDENCE,
                    is_primary: false,
                });
            }
        }

        for (canonical, pattern) in &self.entity_patterns {
            if pattern.is_match(title) {
                if let Some(entity) = entities.iter_mut().find(|e| e.name == *canonical) {
                    entity.is_primary = true;
                    entity.confidence = TITLE_MATCH_CONFIDENCE;
                }
                break;
            }
        }

        entities
    }

    /// Split a batch by method, run the LLM path as one batch call, run
    /// rule-based extraction inline, and return per-article outcomes.
    pub async fn batch_extract(
        &self,
        articles: &[Article],
        gateway: &LlmGateway,
    ) -> Result<HashMap<Uuid, ArticleExtraction>> {
        let mut llm_articles: Vec<&Article> = Vec::new();
        let mut results: HashMap<Uuid, ArticleExtraction> = HashMap::new();

        for article in articles {
            if self.should_use_llm(&article.source, &article.title) {
                llm_articles.push(article);
            } else {
                results.insert(
                    article.id,
                    ArticleExtraction {
                        article_id: article.id,
                        method: ExtractionMethod::RuleBased,
                        entities: self.extract_rule_based(&article.title, &article.text),
                        sentiment: None,
                    },
                );
            }
        }

        if !llm_articles.is_empty() {
            let inputs: Vec<EntityExtractionInput> = llm_articles
                .iter()
                .map(|a| EntityExtractionInput {
                    title: a.title.clone(),
                    text: a.text.clone(),
                })
                .collect();

            let extractions = gateway.extract_entities_batch(&inputs).await?;

            for (article, extraction) in llm_articles.iter().zip(extractions) {
                let mut entities: Vec<ArticleEntity> = Vec::new();
                for e in extraction.primary_entities {
                    entities.push(ArticleEntity {
                        name: e.name,
                        entity_type: e.entity_type,
                        ticker: e.ticker,
                        confidence: e.confidence,
                        is_primary: true,
                    });
                }
                for e in extraction.context_entities {
                    entities.push(ArticleEntity {
                        name: e.name,
                        entity_type: e.entity_type,
                        ticker: e.ticker,
                        confidence: e.confidence,
                        is_primary: false,
                    });
                }

                results.insert(
                    article.id,
                    ArticleExtraction {
                        article_id: article.id,
                        method: ExtractionMethod::Llm,
                        entities,
                        sentiment: extraction
                            .sentiment
                            .as_deref()
                            .and_then(|s| s.parse().ok()),
                    },
                );
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> SelectiveProcessor {
        SelectiveProcessor::new()
    }

    #[test]
    fn premium_sources_always_use_llm() {
        assert!(processor().should_use_llm("coindesk", "Quiet day in the markets"));
        assert!(processor().should_use_llm("Reuters", "Weather report"));
    }

    #[test]
    fn skip_sources_never_use_llm() {
        assert!(!processor().should_use_llm("newsbtc", "Bitcoin hacked! SEC lawsuit! ETF!"));
    }

    #[test]
    fn mid_tier_sources_qualify_on_title_keywords() {
        let p = processor();
        assert!(p.should_use_llm("someblog", "Exchange announces ETF approval"));
        assert!(!p.should_use_llm("someblog", "Five wallets reviewed and compared"));
    }

    #[test]
    fn rule_extraction_marks_first_title_entity_primary() {
        let entities = processor().extract_rule_based(
            "Solana outage resolved",
            "Validators restarted the network. Ethereum was unaffected.",
        );

        let solana = entities.iter().find(|e| e.name == "Solana").unwrap();
        assert!(solana.is_primary);
        assert!((solana.confidence - 0.85).abs() < 1e-9);

        let ethereum = entities.iter().find(|e| e.name == "Ethereum").unwrap();
        assert!(!ethereum.is_primary);
        assert!((ethereum.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn rule_extraction_normalizes_tickers_to_canonical_names() {
        let entities = processor().extract_rule_based("BTC reclaims highs", "eth follows");
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Bitcoin"));
        assert!(names.contains(&"Ethereum"));
    }

    #[test]
    fn rule_extraction_respects_word_boundaries() {
        // "solid" must not match SOL.
        let entities = processor().extract_rule_based("A solid quarter for exchanges", "");
        assert!(entities.iter().all(|e| e.name != "Solana"));
    }

    #[test]
    fn rule_extraction_empty_when_nothing_matches() {
        assert!(processor().extract_rule_based("No assets here", "none at all").is_empty());
    }
}
