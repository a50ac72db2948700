use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // LLM provider
    pub anthropic_api_key: String,
    pub llm_cheap_model: String,
    pub llm_capable_model: String,
    /// Models tried in order when the primary returns 403.
    pub llm_fallback_models: Vec<String>,
    pub llm_cache_ttl_hours: i64,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Enrichment
    pub entity_extraction_batch_size: usize,

    // Narrative detection tuning
    pub dormant_days_threshold: i64,
    pub reactivation_window_days: i64,
    pub shallow_merge_similarity: f64,
    pub link_strength_threshold: f64,
    pub core_actor_salience: f64,
    pub narrative_lookback_hours: i64,
    pub min_cluster_size: usize,

    // Worker cadences (seconds)
    pub rss_interval_secs: u64,
    pub enrichment_interval_secs: u64,
    pub signal_interval_secs: u64,
    pub narrative_interval_secs: u64,
    pub consolidation_interval_secs: u64,
    pub alert_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            llm_cheap_model: env::var("LLM_CHEAP_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-20241022".to_string()),
            llm_capable_model: env::var("LLM_CAPABLE_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            llm_fallback_models: env::var("LLM_FALLBACK_MODELS")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            llm_cache_ttl_hours: parsed_env("LLM_CACHE_TTL_HOURS", 168),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 3000),
            entity_extraction_batch_size: parsed_env("ENTITY_EXTRACTION_BATCH_SIZE", 25),
            dormant_days_threshold: parsed_env("DORMANT_DAYS_THRESHOLD", 7),
            reactivation_window_days: parsed_env("REACTIVATION_WINDOW_DAYS", 30),
            shallow_merge_similarity: parsed_env("SHALLOW_MERGE_SIMILARITY", 0.5),
            link_strength_threshold: parsed_env("LINK_STRENGTH_THRESHOLD", 0.8),
            core_actor_salience: parsed_env("CORE_ACTOR_SALIENCE", 4.5),
            narrative_lookback_hours: parsed_env("NARRATIVE_LOOKBACK_HOURS", 48),
            min_cluster_size: parsed_env("MIN_CLUSTER_SIZE", 3),
            rss_interval_secs: parsed_env("RSS_INTERVAL_SECS", 600),
            enrichment_interval_secs: parsed_env("ENRICHMENT_INTERVAL_SECS", 300),
            signal_interval_secs: parsed_env("SIGNAL_INTERVAL_SECS", 600),
            narrative_interval_secs: parsed_env("NARRATIVE_INTERVAL_SECS", 1800),
            consolidation_interval_secs: parsed_env("CONSOLIDATION_INTERVAL_SECS", 3600),
            alert_interval_secs: parsed_env("ALERT_INTERVAL_SECS", 900),
        }
    }

    /// Log the shape of each sensitive env var without leaking its value.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
