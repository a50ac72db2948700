use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::Store;

/// One logged LLM call. Cache hits log with cost 0.
#[derive(Debug, Clone)]
pub struct CostRecord {
    pub operation: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub cached: bool,
    pub cache_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyCost {
    pub day: String,
    pub operation: String,
    pub total_cost: f64,
    pub total_calls: i64,
    pub cached_calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CostSummary {
    pub month_to_date: f64,
    pub projected_monthly: f64,
    pub days_elapsed: i64,
    pub total_calls: i64,
    pub cached_calls: i64,
    pub cache_hit_rate_percent: f64,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl Store {
    /// Record an API call. Callers treat failures as best-effort; this
    /// method itself only reports them.
    pub async fn record_cost(&self, record: &CostRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_costs
             (operation, model, input_tokens, output_tokens, cost_usd, cached, cache_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.operation)
        .bind(&record.model)
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.cost_usd)
        .bind(record.cached)
        .bind(&record.cache_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Per-day, per-operation cost breakdown over the lookback.
    pub async fn daily_costs(&self, days: i64) -> Result<Vec<DailyCost>> {
        let cutoff = Utc::now() - Duration::days(days);
        let rows = sqlx::query_as::<_, DailyCost>(
            "SELECT to_char(created_at, 'YYYY-MM-DD') AS day,
                    operation,
                    coalesce(sum(cost_usd), 0) AS total_cost,
                    count(*) AS total_calls,
                    count(*) FILTER (WHERE cached) AS cached_calls,
                    coalesce(sum(input_tokens), 0)::BIGINT AS input_tokens,
                    coalesce(sum(output_tokens), 0)::BIGINT AS output_tokens
             FROM api_costs
             WHERE created_at >= $1
             GROUP BY day, operation
             ORDER BY day ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Current-month totals with a linear projection.
    pub async fn monthly_cost_summary(&self) -> Result<CostSummary> {
        let now = Utc::now();
        let start_of_month = start_of_month(now);

        let row: Option<(f64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT coalesce(sum(cost_usd), 0),
                    count(*),
                    count(*) FILTER (WHERE cached),
                    coalesce(sum(input_tokens), 0)::BIGINT,
                    coalesce(sum(output_tokens), 0)::BIGINT
             FROM api_costs WHERE created_at >= $1",
        )
        .bind(start_of_month)
        .fetch_optional(&self.pool)
        .await?;

        let Some((total_cost, total_calls, cached_calls, input_tokens, output_tokens)) = row
        else {
            return Ok(CostSummary::default());
        };

        let days_elapsed = (now - start_of_month).num_days() + 1;
        let projected_monthly = total_cost / days_elapsed as f64 * 30.0;
        let cache_hit_rate_percent = if total_calls > 0 {
            cached_calls as f64 / total_calls as f64 * 100.0
        } else {
            0.0
        };

        Ok(CostSummary {
            month_to_date: total_cost,
            projected_monthly,
            days_elapsed,
            total_calls,
            cached_calls,
            cache_hit_rate_percent,
            input_tokens,
            output_tokens,
        })
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .expect("day 1 always exists")
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_of_month_truncates() {
        let now = DateTime::parse_from_rfc3339("2026-08-17T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let start = start_of_month(now);
        assert_eq!(start.to_rfc3339(), "2026-08-01T00:00:00+00:00");
    }
}
