//! Postgres-backed symptom log and analysis cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::trends::ports::{AnalysisCache, PortError, SymptomSource};
use crate::models::{AnalysisPeriod, KeyMetrics, NewSymptom, SymptomRecord, TrendAnalysis, VisionInsight};

#[derive(Clone)]
pub struct PgSymptomStore {
    pool: PgPool,
}

impl PgSymptomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, symptom: &NewSymptom) -> Result<SymptomRecord, sqlx::Error> {
        sqlx::query_as::<_, SymptomRecord>(
            "INSERT INTO symptoms (user_id, text, voice_transcript, image_url)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, created_at, text, voice_transcript, image_url",
        )
        .bind(symptom.user_id)
        .bind(&symptom.text)
        .bind(&symptom.voice_transcript)
        .bind(&symptom.image_url)
        .fetch_one(&self.pool)
        .await
    }

    /// Newest first.
    pub async fn list_all(&self, user_id: Uuid) -> Result<Vec<SymptomRecord>, sqlx::Error> {
        sqlx::query_as::<_, SymptomRecord>(
            "SELECT id, user_id, created_at, text, voice_transcript, image_url
             FROM symptoms
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM symptoms WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Peer chat messages; only the moderation columns are written here.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn flag(&self, id: Uuid, reason: &str, at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE chat_messages
             SET is_flagged = TRUE, flagged_reason = $2, moderated_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SymptomSource for PgSymptomStore {
    async fn list_symptoms(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<SymptomRecord>, PortError> {
        let rows = sqlx::query_as::<_, SymptomRecord>(
            "SELECT id, user_id, created_at, text, voice_transcript, image_url
             FROM symptoms
             WHERE user_id = $1 AND created_at >= $2
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct PgAnalysisCache {
    pool: PgPool,
}

impl PgAnalysisCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AnalysisRow {
    user_id: Uuid,
    analysis_period: i32,
    pattern_summary: String,
    vision_insights: Json<Vec<VisionInsight>>,
    narrative_summary: String,
    key_metrics: Json<KeyMetrics>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AnalysisRow> for TrendAnalysis {
    type Error = PortError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let period_days = u32::try_from(row.analysis_period)
            .map_err(|e| PortError::Decode(e.to_string()))
            .and_then(|days| AnalysisPeriod::try_from(days).map_err(PortError::Decode))?;

        Ok(Self {
            user_id: row.user_id,
            period_days,
            pattern_summary: row.pattern_summary,
            vision_insights: row.vision_insights.0,
            narrative_summary: row.narrative_summary,
            key_metrics: row.key_metrics.0,
            updated_at: row.updated_at,
        })
    }
}

fn period_column(period: AnalysisPeriod) -> i32 {
    // Every offered period fits comfortably.
    i32::try_from(period.days()).unwrap_or(i32::MAX)
}

#[async_trait]
impl AnalysisCache for PgAnalysisCache {
    async fn get_analysis(&self, user_id: Uuid, period: AnalysisPeriod) -> Result<Option<TrendAnalysis>, PortError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            "SELECT user_id, analysis_period, pattern_summary, vision_insights,
                    narrative_summary, key_metrics, updated_at
             FROM trends_analysis
             WHERE user_id = $1 AND analysis_period = $2",
        )
        .bind(user_id)
        .bind(period_column(period))
        .fetch_optional(&self.pool)
        .await?;

        row.map(TrendAnalysis::try_from).transpose()
    }

    async fn upsert_analysis(&self, analysis: &TrendAnalysis) -> Result<TrendAnalysis, PortError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            "INSERT INTO trends_analysis
                 (user_id, analysis_period, pattern_summary, vision_insights,
                  narrative_summary, key_metrics, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id, analysis_period) DO UPDATE SET
                 pattern_summary = EXCLUDED.pattern_summary,
                 vision_insights = EXCLUDED.vision_insights,
                 narrative_summary = EXCLUDED.narrative_summary,
                 key_metrics = EXCLUDED.key_metrics,
                 updated_at = EXCLUDED.updated_at
             RETURNING user_id, analysis_period, pattern_summary, vision_insights,
                       narrative_summary, key_metrics, updated_at",
        )
        .bind(analysis.user_id)
        .bind(period_column(analysis.period_days))
        .bind(&analysis.pattern_summary)
        .bind(Json(&analysis.vision_insights))
        .bind(&analysis.narrative_summary)
        .bind(Json(&analysis.key_metrics))
        .bind(analysis.updated_at)
        .fetch_one(&self.pool)
        .await?;

        TrendAnalysis::try_from(row)
    }
}
