use std::sync::Arc;

use axum::{
    Router,
    routing::get,
    extract::{State, Query},
    Json,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::models::{AnalysisPeriod, ChartDataPoint, MetricsStats, TrendAnalysis};
use crate::trends::{metrics, TrendAnalyzer};

#[derive(Deserialize)]
struct TrendQuery {
    user_id: Uuid,
    #[serde(default)]
    period: AnalysisPeriod,
}

/// Body of a failed refresh: the error, plus whatever was stored before so
/// the caller can keep showing it.
#[derive(Serialize)]
struct TrendFailure {
    error: String,
    retryable: bool,
    last_analysis: Option<TrendAnalysis>,
}

pub fn routes(analyzer: Arc<TrendAnalyzer>) -> Router {
    Router::new()
        .route("/trends", get(get_analysis))
        .route("/trends/stats", get(get_stats))
        .route("/trends/chart", get(get_chart))
        .with_state(analyzer)
}

async fn get_analysis(
    State(analyzer): State<Arc<TrendAnalyzer>>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendAnalysis>, (StatusCode, Json<TrendFailure>)> {
    match analyzer.get_or_refresh(query.user_id, query.period).await {
        Ok(analysis) => Ok(Json(analysis)),
        Err(e) => {
            tracing::error!(user_id = %query.user_id, period = %query.period, "❌ trend refresh failed: {}", e);
            let last_analysis = analyzer
                .cached(query.user_id, query.period)
                .await
                .unwrap_or_else(|cache_err| {
                    tracing::error!("❌ could not read previous analysis: {}", cache_err);
                    None
                });
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(TrendFailure { error: e.to_string(), retryable: true, last_analysis }),
            ))
        }
    }
}

async fn stored(analyzer: &TrendAnalyzer, query: &TrendQuery) -> Result<TrendAnalysis, StatusCode> {
    analyzer
        .cached(query.user_id, query.period)
        .await
        .map_err(|e| {
            tracing::error!("❌ DB error reading trend analysis: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_stats(
    State(analyzer): State<Arc<TrendAnalyzer>>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<MetricsStats>, StatusCode> {
    let analysis = stored(&analyzer, &query).await?;
    Ok(Json(metrics::stats(&analysis.key_metrics)))
}

async fn get_chart(
    State(analyzer): State<Arc<TrendAnalyzer>>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<ChartDataPoint>>, StatusCode> {
    let analysis = stored(&analyzer, &query).await?;
    Ok(Json(metrics::chart_points(&analysis.key_metrics)))
}
