//! Error types for SLO monitoring.

use thiserror::Error;

/// Monitoring result type.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors raised by the SLO monitor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MonitorError {
    /// No SLO is defined under this name.
    #[error("Unknown SLO: {0}")]
    UnknownSlo(String),

    /// An SLO definition violates its invariants.
    #[error("Invalid SLO definition: {0}")]
    InvalidSlo(String),

    /// Prometheus registration or encoding failed.
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for MonitorError {
    fn from(err: prometheus::Error) -> Self {
        MonitorError::Metrics(err.to_string())
    }
}
