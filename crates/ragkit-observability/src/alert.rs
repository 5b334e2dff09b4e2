//! Alerts and alert observers.
//!
//! The monitor appends alerts to an active list and notifies observers; it
//! never sends email or webhooks itself. Alerts carry enough context for an
//! external notifier to route them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How bad the crossing is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Below the alert threshold with error budget left.
    Warning,
    /// Below the alert threshold with the error budget fully spent.
    Critical,
}

/// A threshold-crossing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id.
    pub id: String,
    /// Name of the SLO that crossed.
    pub slo: String,
    /// Crossing severity.
    pub severity: AlertSeverity,
    /// SLI at the most recent trigger.
    pub current_sli: f64,
    /// The SLO target.
    pub target: f64,
    /// The threshold that was crossed.
    pub alert_threshold: f64,
    /// Most recent trigger time.
    pub timestamp: DateTime<Utc>,
}

/// Receives alerts as they fire. Implementations must not block.
pub trait AlertObserver: Send + Sync {
    /// Handle one alert.
    fn on_alert(&self, alert: &Alert);
}

/// Default observer: structured `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertObserver;

impl AlertObserver for TracingAlertObserver {
    fn on_alert(&self, alert: &Alert) {
        warn!(
            slo = %alert.slo,
            severity = ?alert.severity,
            current_sli = format!("{:.4}", alert.current_sli),
            target = alert.target,
            alert_threshold = alert.alert_threshold,
            "SLO alert"
        );
    }
}

/// Collects alerts in memory, useful for tests and buffering notifiers.
#[derive(Debug, Default)]
pub struct CollectingAlertObserver {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingAlertObserver {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every alert seen.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

impl AlertObserver for CollectingAlertObserver {
    fn on_alert(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}
