//! Trend analysis: symptom history run through three AI services, cached per
//! user and lookback period.

pub mod analyzer;
pub mod clients;
pub mod metrics;
pub mod ports;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub use analyzer::{TrendAnalyzer, TrendConfig, TrendPorts};
use ports::PortError;

/// The three external AI services, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Patterns,
    Vision,
    Summary,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns => write!(f, "pattern analysis"),
            Self::Vision => write!(f, "vision"),
            Self::Summary => write!(f, "narrative summary"),
        }
    }
}

/// A refresh that did not complete. Nothing was written to the cache.
#[derive(Debug, Error)]
pub enum TrendError {
    #[error("could not read symptoms: {0}")]
    Symptoms(#[source] PortError),

    #[error("analysis cache failed: {0}")]
    Cache(#[source] PortError),

    #[error("{service} service failed: {source}")]
    Service {
        service: Service,
        #[source]
        source: PortError,
    },

    #[error("{dependency} timed out after {after:?}")]
    Timeout { dependency: &'static str, after: Duration },
}

