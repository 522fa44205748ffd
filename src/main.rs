use axum::{routing::get, Router};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use anyhow::{Context, Result};

mod config;
mod medications;
mod models;
mod moderation;
mod routes;
mod schedule;
mod store;
mod streak;
mod trends;

use config::AppConfig;
use medications::MedicationBoard;
use store::{PgAnalysisCache, PgMessageStore, PgSymptomStore};
use streak::StreakBoard;
use trends::clients::{AnthropicPatternAnalyzer, GoogleVisionExtractor, OpenAiSummarizer};
use trends::{TrendAnalyzer, TrendPorts};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;
    sqlx::migrate!().run(&pool).await.context("running migrations")?;

    let symptoms = PgSymptomStore::new(pool.clone());
    let timeout = config.trends.call_timeout;
    let analyzer = TrendAnalyzer::new(
        TrendPorts {
            symptoms: Arc::new(symptoms.clone()),
            patterns: Arc::new(AnthropicPatternAnalyzer::new(config.patterns.clone(), timeout)?),
            vision: Arc::new(GoogleVisionExtractor::new(
                config.vision_base_url.clone(),
                config.vision_api_key.clone(),
                timeout,
            )?),
            summarizer: Arc::new(OpenAiSummarizer::new(config.summary.clone(), timeout)?),
            cache: Arc::new(PgAnalysisCache::new(pool.clone())),
        },
        config.trends,
    );

    let app = Router::new()
        .merge(routes::symptoms::routes(symptoms))
        .merge(routes::medications::routes(MedicationBoard::new()))
        .merge(routes::streak::routes(StreakBoard::new()))
        .merge(routes::moderation::routes(PgMessageStore::new(pool.clone())))
        .merge(routes::trends::routes(Arc::new(analyzer)))
        .route("/health", get(|| async { "✅ Backend up" }));

    tracing::info!("🧠 Server running at {}", config.bind_addr);

    axum::serve(
        tokio::net::TcpListener::bind(config.bind_addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
