use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chainpulse_common::{is_primary_entity_type, normalize_entity_name, NarrativeElements};
use chainpulse_store::Store;
use llm_client::{ChatRequest, Claude, LlmError};

use crate::cache::{cache_key, CacheStats, LlmCache};
use crate::cost::CostTracker;
use crate::parse::{parse_json_lenient, parse_leading_number};
use crate::prompts;

/// Per-call timeout; batched entity extraction gets the longer bound.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const BATCH_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Input to entity extraction: one article's title and text.
#[derive(Debug, Clone)]
pub struct EntityExtractionInput {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.9
}

/// Structured result of entity extraction for one article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityExtraction {
    #[serde(default)]
    pub primary_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub context_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub title: String,
    pub summary: String,
}

#[derive(Serialize, Deserialize)]
struct NumberEnvelope {
    value: f64,
}

#[derive(Serialize, Deserialize)]
struct ThemesEnvelope {
    themes: Vec<String>,
}

/// Two-tier LLM gateway. The cheap model handles extraction and
/// classification; the capable model writes narrative titles and summaries.
/// Every call goes through the shared cache and the cost tracker.
#[derive(Clone)]
pub struct LlmGateway {
    claude: Claude,
    cheap_model: String,
    capable_model: String,
    /// Tried in order on 403 before giving up.
    fallback_models: Vec<String>,
    cache: Arc<LlmCache>,
    costs: CostTracker,
}

impl LlmGateway {
    pub fn new(
        api_key: &str,
        store: Store,
        cheap_model: &str,
        capable_model: &str,
        fallback_models: Vec<String>,
        cache_ttl_hours: i64,
    ) -> Self {
        Self {
            claude: Claude::new(api_key),
            cheap_model: cheap_model.to_string(),
            capable_model: capable_model.to_string(),
            fallback_models,
            cache: Arc::new(LlmCache::new(store.clone(), cache_ttl_hours)),
            costs: CostTracker::new(store),
        }
    }

    pub fn cache(&self) -> &LlmCache {
        &self.cache
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.cache.stats().await
    }

    pub async fn cost_summary(&self) -> Result<chainpulse_store::CostSummary> {
        self.costs.monthly_summary().await
    }

    /// Extract structured entities for a batch of articles, one cache entry
    /// per article. Returned primary entities and crypto-typed context
    /// entities are normalized before caching.
    pub async fn extract_entities_batch(
        &self,
        articles: &[EntityExtractionInput],
    ) -> Result<Vec<EntityExtraction>> {
        let mut results = Vec::with_capacity(articles.len());
        for article in articles {
            let prompt = prompts::entity_extraction(&article.title, &article.text);
            let extraction = self
                .cached_json(
                    "entity_extraction",
                    &self.cheap_model,
                    &prompt,
                    1000,
                    0.3,
                    BATCH_CALL_TIMEOUT,
                    |text| parse_json_lenient::<EntityExtraction>(text).map(normalize_extraction),
                )
                .await?
                .unwrap_or_default();
            results.push(extraction);
        }
        Ok(results)
    }

    /// Extract narrative elements from one article. Returns None when the
    /// response is unparseable or missing the fields a cluster needs.
    pub async fn discover_narrative(
        &self,
        title: &str,
        text: &str,
    ) -> Result<Option<NarrativeElements>> {
        let prompt = prompts::narrative_discovery(title, text);
        let parsed = self
            .cached_json(
                "narrative_extraction",
                &self.cheap_model,
                &prompt,
                800,
                0.3,
                CALL_TIMEOUT,
                |text| {
                    parse_json_lenient::<NarrativeElements>(text).filter(|elements| {
                        !elements.nucleus_entity.trim().is_empty()
                            && !elements.actors.is_empty()
                            && !elements.actions.is_empty()
                    })
                },
            )
            .await?;
        Ok(parsed)
    }

    /// Generate a title (<= 60 chars) and 2-3 sentence summary for a
    /// cluster. Uses the capable tier; falls back to the first article's
    /// title when the model output cannot be parsed.
    pub async fn summarize_cluster(&self, snippets: &[String]) -> Result<Option<ClusterSummary>> {
        let prompt = prompts::cluster_summary(snippets);
        let summary = self
            .cached_json(
                "narrative_summary",
                &self.capable_model,
                &prompt,
                500,
                0.7,
                CALL_TIMEOUT,
                |text| {
                    parse_json_lenient::<ClusterSummary>(text).map(|mut s| {
                        s.title = clamp_title(&s.title);
                        s
                    })
                },
            )
            .await?;
        Ok(summary)
    }

    /// Sentiment score in [-1, 1]. Fails closed to 0.0 on parse trouble.
    pub async fn analyze_sentiment(&self, text: &str) -> Result<f64> {
        let prompt = prompts::sentiment(text);
        let parsed = self
            .cached_json(
                "sentiment",
                &self.cheap_model,
                &prompt,
                20,
                0.0,
                CALL_TIMEOUT,
                |text| parse_leading_number(text).map(|v| NumberEnvelope { value: v.clamp(-1.0, 1.0) }),
            )
            .await?;
        Ok(parsed.map(|e| e.value).unwrap_or(0.0))
    }

    /// Relevance score in [0, 1]. Fails closed to 0.0.
    pub async fn score_relevance(&self, text: &str) -> Result<f64> {
        let prompt = prompts::relevance(text);
        let parsed = self
            .cached_json(
                "relevance",
                &self.cheap_model,
                &prompt,
                20,
                0.0,
                CALL_TIMEOUT,
                |text| parse_leading_number(text).map(|v| NumberEnvelope { value: v.clamp(0.0, 1.0) }),
            )
            .await?;
        Ok(parsed.map(|e| e.value).unwrap_or(0.0))
    }

    /// Short theme keywords. Fails closed to an empty list.
    pub async fn extract_themes(&self, text: &str) -> Result<Vec<String>> {
        let prompt = prompts::themes(text);
        let parsed = self
            .cached_json(
                "themes",
                &self.cheap_model,
                &prompt,
                100,
                0.3,
                CALL_TIMEOUT,
                |text| {
                    let themes: Vec<String> = text
                        .trim()
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty() && t.len() < 60)
                        .collect();
                    if themes.is_empty() {
                        None
                    } else {
                        Some(ThemesEnvelope { themes })
                    }
                },
            )
            .await?;
        Ok(parsed.map(|e| e.themes).unwrap_or_default())
    }

    /// Cache-through completion: single-flight per key, model fallback on
    /// 403, cost tracking on every path. Parse failures return Ok(None) and
    /// are never cached.
    async fn cached_json<T, F>(
        &self,
        operation: &str,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
        parse: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: Fn(&str) -> Option<T>,
    {
        let key = cache_key(model, prompt);
        let _guard = self.cache.lock_key(&key).await;

        if let Some(cached) = self.cache.get(&key).await? {
            self.costs
                .track(operation, model, 0, 0, true, Some(&key))
                .await;
            if let Ok(value) = serde_json::from_value::<T>(cached) {
                return Ok(Some(value));
            }
            // A shape mismatch means the cached value predates a format
            // change; fall through and recompute.
            warn!(operation, "cached response had unexpected shape, recomputing");
        }

        let completion = match self.complete_with_fallback(model, prompt, max_tokens, temperature, timeout).await {
            Ok(completion) => completion,
            Err(e) => return Err(anyhow::anyhow!("{operation} call failed: {e}")),
        };

        self.costs
            .track(
                operation,
                &completion.model,
                completion.input_tokens,
                completion.output_tokens,
                false,
                Some(&key),
            )
            .await;

        match parse(&completion.text) {
            Some(value) => {
                let json = serde_json::to_value(&value)?;
                self.cache.put(&key, &completion.model, &json).await?;
                Ok(Some(value))
            }
            None => {
                warn!(operation, model, "unparseable LLM response, returning empty result");
                Ok(None)
            }
        }
    }

    /// Try the requested model, then each fallback in order on 403. Other
    /// transport errors fail immediately.
    async fn complete_with_fallback(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<ModelCompletion, LlmError> {
        let mut models = vec![model.to_string()];
        models.extend(
            self.fallback_models
                .iter()
                .filter(|m| m.as_str() != model)
                .cloned(),
        );

        let mut last_denied: Option<LlmError> = None;
        for candidate in &models {
            let request = ChatRequest::new(candidate, prompt)
                .max_tokens(max_tokens)
                .temperature(temperature)
                .timeout(timeout);

            match self.claude.complete(&request).await {
                Ok(completion) => {
                    return Ok(ModelCompletion {
                        model: candidate.clone(),
                        text: completion.text,
                        input_tokens: completion.input_tokens,
                        output_tokens: completion.output_tokens,
                    })
                }
                Err(e) if e.is_access_denied() => {
                    debug!(model = candidate.as_str(), "model access denied, trying fallback");
                    last_denied = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_denied.unwrap_or(LlmError::EmptyCompletion))
    }
}

struct ModelCompletion {
    model: String,
    text: String,
    input_tokens: u64,
    output_tokens: u64,
}

/// Normalize entity names in an extraction result: all primary entities,
/// and context entities typed as crypto assets.
fn normalize_extraction(mut extraction: EntityExtraction) -> EntityExtraction {
    for entity in &mut extraction.primary_entities {
        entity.name = normalize_entity_name(&entity.name);
    }
    for entity in &mut extraction.context_entities {
        if entity.entity_type == "cryptocurrency" || is_primary_entity_type(&entity.entity_type) {
            entity.name = normalize_entity_name(&entity.name);
        }
    }
    extraction
}

/// Titles are bounded at 60 characters; cut at a character boundary.
fn clamp_title(title: &str) -> String {
    llm_client::truncate_to_char_boundary(title.trim(), 60).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_normalizes_primary_and_crypto_context_entities() {
        let raw = EntityExtraction {
            primary_entities: vec![ExtractedEntity {
                name: "BTC".into(),
                entity_type: "cryptocurrency".into(),
                ticker: Some("BTC".into()),
                confidence: 0.95,
            }],
            context_entities: vec![
                ExtractedEntity {
                    name: "$eth".into(),
                    entity_type: "cryptocurrency".into(),
                    ticker: None,
                    confidence: 0.8,
                },
                ExtractedEntity {
                    name: "Gary Gensler".into(),
                    entity_type: "person".into(),
                    ticker: None,
                    confidence: 0.8,
                },
            ],
            sentiment: Some("neutral".into()),
        };

        let normalized = normalize_extraction(raw);
        assert_eq!(normalized.primary_entities[0].name, "Bitcoin");
        assert_eq!(normalized.context_entities[0].name, "Ethereum");
        assert_eq!(normalized.context_entities[1].name, "Gary Gensler");
    }

    #[test]
    fn extraction_deserializes_partial_payloads() {
        let parsed: EntityExtraction =
            serde_json::from_str("{\"primary_entities\": []}").unwrap();
        assert!(parsed.primary_entities.is_empty());
        assert!(parsed.context_entities.is_empty());
        assert!(parsed.sentiment.is_none());
    }

    #[test]
    fn titles_clamp_to_sixty_chars() {
        let long = "A".repeat(100);
        assert_eq!(clamp_title(&long).len(), 60);
        assert_eq!(clamp_title("  short  "), "short");
    }
}
