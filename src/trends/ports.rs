//! Collaborators the trend orchestrator depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AnalysisPeriod, SymptomRecord, TrendAnalysis, VisionInsight};

/// Failure reported by an adapter.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for PortError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<sqlx::Error> for PortError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[async_trait]
pub trait SymptomSource: Send + Sync {
    /// Records created at or after `since`, oldest first.
    async fn list_symptoms(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<Vec<SymptomRecord>, PortError>;
}

#[async_trait]
pub trait PatternAnalyzer: Send + Sync {
    async fn analyze_patterns(&self, text: &str) -> Result<String, PortError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Recognised text of the image; empty when there is none.
    async fn extract_text(&self, image_url: &str) -> Result<String, PortError>;
}

#[async_trait]
pub trait NarrativeSummarizer: Send + Sync {
    async fn summarize(&self, patterns: &str, insights: &[VisionInsight]) -> Result<String, PortError>;
}

#[async_trait]
pub trait AnalysisCache: Send + Sync {
    async fn get_analysis(&self, user_id: Uuid, period: AnalysisPeriod) -> Result<Option<TrendAnalysis>, PortError>;

    /// Insert or replace the row for `(user_id, period_days)`.
    async fn upsert_analysis(&self, analysis: &TrendAnalysis) -> Result<TrendAnalysis, PortError>;
}
