//! Idempotent boot migrations. Every statement is IF NOT EXISTS so workers
//! can race on startup without coordination.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    // --- articles ---
    "CREATE TABLE IF NOT EXISTS articles (
        id UUID PRIMARY KEY,
        source TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        text TEXT NOT NULL DEFAULT '',
        published_at TIMESTAMPTZ NOT NULL,
        relevance_tier INT,
        relevance_score DOUBLE PRECISION,
        relevance_reason TEXT,
        sentiment_score DOUBLE PRECISION,
        sentiment_label TEXT,
        themes JSONB NOT NULL DEFAULT '[]',
        keywords JSONB NOT NULL DEFAULT '[]',
        entities JSONB NOT NULL DEFAULT '[]',
        narrative_summary JSONB,
        nucleus_entity TEXT,
        narrative_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at)",
    "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles (source)",
    "CREATE INDEX IF NOT EXISTS idx_articles_nucleus_entity ON articles (nucleus_entity)",
    "CREATE INDEX IF NOT EXISTS idx_articles_narrative_id ON articles (narrative_id)",
    "CREATE INDEX IF NOT EXISTS idx_articles_fts
        ON articles USING GIN (to_tsvector('english', title || ' ' || text))",
    // --- entity_mentions ---
    "CREATE TABLE IF NOT EXISTS entity_mentions (
        id UUID PRIMARY KEY,
        entity TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        article_id UUID NOT NULL,
        sentiment TEXT NOT NULL DEFAULT 'neutral',
        confidence DOUBLE PRECISION NOT NULL DEFAULT 0.0,
        is_primary BOOLEAN NOT NULL DEFAULT FALSE,
        source TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_mentions_entity ON entity_mentions (entity)",
    "CREATE INDEX IF NOT EXISTS idx_mentions_entity_primary_ts
        ON entity_mentions (entity, is_primary, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_mentions_article_id ON entity_mentions (article_id)",
    // --- signal_scores ---
    "CREATE TABLE IF NOT EXISTS signal_scores (
        entity TEXT PRIMARY KEY,
        entity_type TEXT NOT NULL,
        score_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        score_7d DOUBLE PRECISION NOT NULL DEFAULT 0,
        score_30d DOUBLE PRECISION NOT NULL DEFAULT 0,
        velocity_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        velocity_7d DOUBLE PRECISION NOT NULL DEFAULT 0,
        velocity_30d DOUBLE PRECISION NOT NULL DEFAULT 0,
        mentions_24h BIGINT NOT NULL DEFAULT 0,
        mentions_7d BIGINT NOT NULL DEFAULT 0,
        mentions_30d BIGINT NOT NULL DEFAULT 0,
        recency_24h DOUBLE PRECISION NOT NULL DEFAULT 0,
        recency_7d DOUBLE PRECISION NOT NULL DEFAULT 0,
        recency_30d DOUBLE PRECISION NOT NULL DEFAULT 0,
        score DOUBLE PRECISION NOT NULL DEFAULT 0,
        velocity DOUBLE PRECISION NOT NULL DEFAULT 0,
        source_count BIGINT NOT NULL DEFAULT 0,
        sentiment JSONB NOT NULL DEFAULT '{}',
        narrative_ids JSONB NOT NULL DEFAULT '[]',
        is_emerging BOOLEAN NOT NULL DEFAULT TRUE,
        first_seen TIMESTAMPTZ NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_signals_score_24h ON signal_scores (score_24h, last_updated)",
    "CREATE INDEX IF NOT EXISTS idx_signals_score_7d ON signal_scores (score_7d, last_updated)",
    "CREATE INDEX IF NOT EXISTS idx_signals_score_30d ON signal_scores (score_30d, last_updated)",
    // --- narratives ---
    "CREATE TABLE IF NOT EXISTS narratives (
        id UUID PRIMARY KEY,
        nucleus_entity TEXT NOT NULL,
        title TEXT NOT NULL,
        summary TEXT NOT NULL DEFAULT '',
        entities JSONB NOT NULL DEFAULT '[]',
        article_ids JSONB NOT NULL DEFAULT '[]',
        article_count BIGINT NOT NULL DEFAULT 0,
        mention_velocity DOUBLE PRECISION NOT NULL DEFAULT 0,
        avg_sentiment DOUBLE PRECISION NOT NULL DEFAULT 0,
        momentum TEXT NOT NULL DEFAULT 'unknown',
        recency_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        entity_relationships JSONB NOT NULL DEFAULT '[]',
        lifecycle_state TEXT NOT NULL,
        lifecycle_history JSONB NOT NULL DEFAULT '[]',
        fingerprint JSONB NOT NULL DEFAULT '{}',
        first_seen TIMESTAMPTZ NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL,
        timeline_data JSONB NOT NULL DEFAULT '[]',
        peak_activity JSONB,
        days_active BIGINT NOT NULL DEFAULT 1,
        reawakening_count BIGINT NOT NULL DEFAULT 0,
        reawakened_from TIMESTAMPTZ,
        resurrection_velocity DOUBLE PRECISION,
        dormant_since TIMESTAMPTZ,
        reactivated_count BIGINT NOT NULL DEFAULT 0,
        merged_into UUID,
        needs_summary_update BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE INDEX IF NOT EXISTS idx_narratives_last_updated ON narratives (last_updated)",
    "CREATE INDEX IF NOT EXISTS idx_narratives_nucleus ON narratives (nucleus_entity)",
    "CREATE INDEX IF NOT EXISTS idx_narratives_lifecycle_state ON narratives (lifecycle_state)",
    "CREATE INDEX IF NOT EXISTS idx_narratives_state_updated
        ON narratives (lifecycle_state, last_updated)",
    "CREATE INDEX IF NOT EXISTS idx_narratives_reawakened_from ON narratives (reawakened_from)",
    // --- llm_cache ---
    "CREATE TABLE IF NOT EXISTS llm_cache (
        cache_key TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        response JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_llm_cache_expires_at ON llm_cache (expires_at)",
    // --- api_costs ---
    "CREATE TABLE IF NOT EXISTS api_costs (
        id BIGSERIAL PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        operation TEXT NOT NULL,
        model TEXT NOT NULL,
        input_tokens BIGINT NOT NULL DEFAULT 0,
        output_tokens BIGINT NOT NULL DEFAULT 0,
        cost_usd DOUBLE PRECISION NOT NULL DEFAULT 0,
        cached BOOLEAN NOT NULL DEFAULT FALSE,
        cache_key TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_api_costs_created_at ON api_costs (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_api_costs_operation ON api_costs (operation)",
    "CREATE INDEX IF NOT EXISTS idx_api_costs_model ON api_costs (model)",
    // --- entity_alerts ---
    "CREATE TABLE IF NOT EXISTS entity_alerts (
        id UUID PRIMARY KEY,
        entity TEXT NOT NULL,
        alert_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        details JSONB NOT NULL DEFAULT '{}',
        resolved BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON entity_alerts (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_entity ON entity_alerts (entity)",
];

pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = STATEMENTS.len(), "store migrations applied");
    Ok(())
}
