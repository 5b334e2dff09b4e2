//! RAGKIT Observability
//!
//! Sliding-window service-level indicators, error-budget accounting, and
//! threshold alerting for pipeline deployments - without coupling to any
//! metrics-export wire protocol. Alerts go to pluggable observers; the
//! monitor never sends email or webhooks itself.
//!
//! # Example
//!
//! ```rust
//! use ragkit_observability::{MonitorConfig, SloMonitor, SloSpec};
//! use std::time::Duration;
//!
//! # fn main() -> ragkit_observability::Result<()> {
//! let monitor = SloMonitor::new(MonitorConfig::default());
//! monitor.define_slo(
//!     "retrieval_success",
//!     SloSpec::target(0.99)
//!         .window(Duration::from_secs(60))
//!         .alert_threshold(0.95)
//!         .description("Retrieval stages returning results"),
//! )?;
//!
//! let sli = monitor.record_measurement("retrieval_success", true, None)?;
//! assert_eq!(sli, 1.0);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod error;
mod export;
pub mod slo;

pub use alert::{Alert, AlertObserver, AlertSeverity, CollectingAlertObserver, TracingAlertObserver};
pub use error::{MonitorError, Result};
pub use slo::{
    ErrorBudget, Measurement, MonitorConfig, Recommendation, Report, ReportSummary, SloHealth,
    SloMonitor, SloSpec, SloStatus,
};
