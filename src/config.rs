use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::trends::clients::{ServiceEndpoint, ANTHROPIC_BASE_URL, OPENAI_BASE_URL, VISION_BASE_URL};
use crate::trends::TrendConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3050";
const DEFAULT_PATTERN_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_SUMMARY_MODEL: &str = "gpt-4";

/// Settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub patterns: ServiceEndpoint,
    pub summary: ServiceEndpoint,
    pub vision_base_url: String,
    pub vision_api_key: String,
    pub trends: TrendConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).ok_or_else(|| anyhow!("{key} must be set"));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timeout_secs: u64 = parsed(&lookup, "AI_CALL_TIMEOUT_SECS", 30)?;
        let trends = TrendConfig {
            vision_batch_limit: parsed(&lookup, "VISION_BATCH_LIMIT", 10)?,
            call_timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            bind_addr: parsed(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse::<SocketAddr>()?)?,
            patterns: ServiceEndpoint {
                base_url: or_default("ANTHROPIC_BASE_URL", ANTHROPIC_BASE_URL),
                api_key: required("ANTHROPIC_API_KEY")?,
                model: or_default("PATTERN_MODEL", DEFAULT_PATTERN_MODEL),
            },
            summary: ServiceEndpoint {
                base_url: or_default("OPENAI_BASE_URL", OPENAI_BASE_URL),
                api_key: required("OPENAI_API_KEY")?,
                model: or_default("SUMMARY_MODEL", DEFAULT_SUMMARY_MODEL),
            },
            vision_base_url: or_default("VISION_BASE_URL", VISION_BASE_URL),
            vision_api_key: required("GOOGLE_VISION_API_KEY")?,
            trends,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
