use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use chainpulse_common::{AlertSeverity, EntityAlert};

use crate::Store;

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    entity: String,
    alert_type: String,
    severity: String,
    details: Json<serde_json::Value>,
    resolved: bool,
    created_at: DateTime<Utc>,
}

impl From<AlertRow> for EntityAlert {
    fn from(row: AlertRow) -> Self {
        EntityAlert {
            id: row.id,
            entity: row.entity,
            alert_type: row.alert_type,
            severity: row.severity.parse().unwrap_or(AlertSeverity::Low),
            details: row.details.0,
            resolved: row.resolved,
            created_at: row.created_at,
        }
    }
}

impl Store {
    pub async fn insert_alert(&self, alert: &EntityAlert) -> Result<()> {
        sqlx::query(
            "INSERT INTO entity_alerts (id, entity, alert_type, severity, details, resolved, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(alert.id)
        .bind(&alert.entity)
        .bind(&alert.alert_type)
        .bind(alert.severity.to_string())
        .bind(Json(&alert.details))
        .bind(alert.resolved)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// True when an unresolved alert of the same type fired for the entity
    /// after the cutoff. Keeps the alert worker from re-firing every cycle.
    pub async fn alert_exists_since(
        &self,
        entity: &str,
        alert_type: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM entity_alerts
             WHERE entity = $1 AND alert_type = $2 AND created_at >= $3 AND NOT resolved
             LIMIT 1",
        )
        .bind(entity)
        .bind(alert_type)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn recent_alerts(
        &self,
        limit: i64,
        severity: Option<AlertSeverity>,
        resolved: Option<bool>,
    ) -> Result<Vec<EntityAlert>> {
        let severity_filter = severity.map(|s| s.to_string());
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT id, entity, alert_type, severity, details, resolved, created_at
             FROM entity_alerts
             WHERE ($2::TEXT IS NULL OR severity = $2)
               AND ($3::BOOLEAN IS NULL OR resolved = $3)
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .bind(severity_filter)
        .bind(resolved)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EntityAlert::from).collect())
    }

    pub async fn resolve_alert(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE entity_alerts SET resolved = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
