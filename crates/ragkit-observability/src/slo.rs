//! Sliding-window SLO monitoring and error-budget accounting.

use crate::alert::{Alert, AlertObserver, AlertSeverity};
use crate::error::{MonitorError, Result};
use crate::export::SloGauges;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Active alerts are kept for 24 hours after their last trigger.
fn alert_retention() -> chrono::Duration {
    chrono::Duration::hours(24)
}

/// Error budget counts as "nearly spent" below this remaining fraction.
const BUDGET_WARNING_FRACTION: f64 = 0.25;

/// Monitor-wide defaults; every field can be overridden per SLO.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Default sliding window for SLI computation.
    pub measurement_window: Duration,
    /// Default alert threshold (clamped to each SLO's target).
    pub alert_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            measurement_window: Duration::from_secs(300),
            alert_threshold: 0.95,
        }
    }
}

/// Caller-facing SLO definition. Unset fields resolve from [`MonitorConfig`]
/// or from the target (`error_budget = 1 - target`).
#[derive(Debug, Clone, Default)]
pub struct SloSpec {
    /// Target SLI in `[0, 1]`.
    pub target: f64,
    /// Sliding window override.
    pub window: Option<Duration>,
    /// Error budget override; defaults to `1 - target`.
    pub error_budget: Option<f64>,
    /// Alert threshold override; must not exceed the target.
    pub alert_threshold: Option<f64>,
    /// Human-readable description.
    pub description: String,
    /// Latency cutoff for `record_response_time`.
    pub latency_threshold_ms: Option<u64>,
}

impl SloSpec {
    /// Start a spec from its target.
    #[must_use]
    pub fn target(target: f64) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Set the sliding window.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }

    /// Set the error budget.
    #[must_use]
    pub fn error_budget(mut self, budget: f64) -> Self {
        self.error_budget = Some(budget);
        self
    }

    /// Set the alert threshold.
    #[must_use]
    pub fn alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = Some(threshold);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the latency cutoff for response-time recording.
    #[must_use]
    pub fn latency_threshold_ms(mut self, ms: u64) -> Self {
        self.latency_threshold_ms = Some(ms);
        self
    }
}

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Arrival time.
    pub timestamp: DateTime<Utc>,
    /// Whether the observation counts as a success.
    pub success: bool,
    /// Optional caller context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Error-budget accounting for one SLO.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorBudget {
    /// The SLO target.
    pub target: f64,
    /// Current SLI.
    pub current: f64,
    /// Total budget (`1 - target` unless overridden).
    pub error_budget: f64,
    /// `max(0, target - current)`.
    pub error_budget_used: f64,
    /// `max(0, error_budget - error_budget_used)`.
    pub error_budget_remaining: f64,
    /// Used budget as a percentage of the total budget.
    pub error_budget_percentage: f64,
}

/// Health classification used by status and report output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SloHealth {
    /// SLI at or above the alert threshold with budget to spare.
    Healthy,
    /// Error budget nearly spent.
    Warning,
    /// SLI below the alert threshold.
    Urgent,
}

/// Point-in-time status of one SLO.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SloStatus {
    /// SLO name.
    pub name: String,
    /// Description from the definition.
    pub description: String,
    /// Current SLI.
    pub current_sli: f64,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Measurements currently inside the window.
    pub measurements_in_window: usize,
    /// Budget accounting.
    pub budget: ErrorBudget,
    /// Health classification.
    pub health: SloHealth,
}

/// Summary block of a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// SLOs defined.
    pub total_slos: usize,
    /// SLOs currently healthy.
    pub healthy: usize,
    /// SLOs in warning.
    pub warning: usize,
    /// SLOs in urgent.
    pub urgent: usize,
}

/// A terse action hint for a non-healthy SLO.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// The SLO the hint applies to.
    pub slo: String,
    /// Why it made the list.
    pub health: SloHealth,
    /// What to do about it.
    pub action: String,
}

/// Full monitoring report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Counts per health class.
    pub summary: ReportSummary,
    /// Per-SLO status.
    pub slos: Vec<SloStatus>,
    /// Active alerts.
    pub alerts: Vec<Alert>,
    /// Action hints for non-healthy SLOs.
    pub recommendations: Vec<Recommendation>,
}

/// Resolved, validated SLO definition.
#[derive(Debug, Clone)]
struct ResolvedSlo {
    target: f64,
    window: Duration,
    error_budget: f64,
    alert_threshold: f64,
    description: String,
    latency_threshold_ms: u64,
}

struct SloState {
    spec: ResolvedSlo,
    measurements: VecDeque<Measurement>,
}

impl SloState {
    /// Drop measurements older than the window. Called on every read and
    /// every write so the window advances lazily.
    fn prune(&mut self, now: DateTime<Utc>) {
        let Ok(window) = chrono::Duration::from_std(self.spec.window) else {
            return;
        };
        let cutoff = now - window;
        while self
            .measurements
            .front()
            .is_some_and(|m| m.timestamp < cutoff)
        {
            self.measurements.pop_front();
        }
    }

    /// `successes / total` over the window; 1.0 for an empty window.
    fn sli(&self) -> f64 {
        if self.measurements.is_empty() {
            return 1.0;
        }
        let successes = self.measurements.iter().filter(|m| m.success).count();
        successes as f64 / self.measurements.len() as f64
    }

    fn budget(&self) -> ErrorBudget {
        let current = self.sli();
        let error_budget = self.spec.error_budget;
        let error_budget_used = (self.spec.target - current).max(0.0);
        let error_budget_remaining = (error_budget - error_budget_used).max(0.0);
        let error_budget_percentage = if error_budget > 0.0 {
            (error_budget_used / error_budget * 100.0).min(100.0)
        } else if error_budget_used > 0.0 {
            100.0
        } else {
            0.0
        };
        ErrorBudget {
            target: self.spec.target,
            current,
            error_budget,
            error_budget_used,
            error_budget_remaining,
            error_budget_percentage,
        }
    }

    fn health(&self) -> SloHealth {
        let budget = self.budget();
        if budget.current < self.spec.alert_threshold {
            SloHealth::Urgent
        } else if budget.error_budget > 0.0
            && budget.error_budget_remaining < budget.error_budget * BUDGET_WARNING_FRACTION
        {
            SloHealth::Warning
        } else {
            SloHealth::Healthy
        }
    }

    fn status(&self, name: &str) -> SloStatus {
        SloStatus {
            name: name.to_string(),
            description: self.spec.description.clone(),
            current_sli: self.sli(),
            window_ms: self.spec.window.as_millis() as u64,
            measurements_in_window: self.measurements.len(),
            budget: self.budget(),
            health: self.health(),
        }
    }
}

/// Sliding-window SLI computation, error-budget math, and threshold
/// alerting. All operations are CPU-only and bounded by window size.
pub struct SloMonitor {
    config: MonitorConfig,
    slos: RwLock<HashMap<String, SloState>>,
    alerts: Mutex<Vec<Alert>>,
    observers: RwLock<Vec<Arc<dyn AlertObserver>>>,
    gauges: SloGauges,
}

impl Default for SloMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl SloMonitor {
    /// Create a monitor with the given defaults.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            slos: RwLock::new(HashMap::new()),
            alerts: Mutex::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            gauges: SloGauges::new(),
        }
    }

    /// Register an alert observer.
    pub fn add_alert_observer(&self, observer: Arc<dyn AlertObserver>) {
        self.observers.write().push(observer);
    }

    /// Define (or redefine) an SLO.
    ///
    /// Invariants: `target` and `error_budget` in `[0, 1]`,
    /// `alert_threshold <= target`. The error budget defaults to
    /// `1 - target`.
    pub fn define_slo(&self, name: impl Into<String>, spec: SloSpec) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(MonitorError::InvalidSlo("name must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&spec.target) {
            return Err(MonitorError::InvalidSlo(format!(
                "target {} outside [0, 1]",
                spec.target
            )));
        }
        let error_budget = spec.error_budget.unwrap_or(1.0 - spec.target);
        if !(0.0..=1.0).contains(&error_budget) {
            return Err(MonitorError::InvalidSlo(format!(
                "error budget {error_budget} outside [0, 1]"
            )));
        }
        let alert_threshold = spec
            .alert_threshold
            .unwrap_or_else(|| self.config.alert_threshold.min(spec.target));
        if alert_threshold > spec.target {
            return Err(MonitorError::InvalidSlo(format!(
                "alert threshold {alert_threshold} exceeds target {}",
                spec.target
            )));
        }

        let resolved = ResolvedSlo {
            target: spec.target,
            window: spec.window.unwrap_or(self.config.measurement_window),
            error_budget,
            alert_threshold,
            description: spec.description,
            latency_threshold_ms: spec.latency_threshold_ms.unwrap_or(1000),
        };
        debug!(slo = %name, target = resolved.target, "SLO defined");
        self.slos.write().insert(
            name,
            SloState {
                spec: resolved,
                measurements: VecDeque::new(),
            },
        );
        Ok(())
    }

    /// Record one measurement and return the current SLI.
    ///
    /// When the SLI sits below the alert threshold, the SLO's active alert
    /// is created or refreshed and every observer is notified.
    pub fn record_measurement(
        &self,
        name: &str,
        success: bool,
        metadata: Option<serde_json::Value>,
    ) -> Result<f64> {
        let now = Utc::now();
        let (sli, alert) = {
            let mut slos = self.slos.write();
            let state = slos
                .get_mut(name)
                .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;
            state.measurements.push_back(Measurement {
                timestamp: now,
                success,
                metadata,
            });
            state.prune(now);

            let sli = state.sli();
            let budget = state.budget();
            self.gauges
                .set(name, sli, budget.error_budget_remaining);

            let alert = (sli < state.spec.alert_threshold).then(|| {
                let severity = if budget.error_budget_remaining <= 0.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                (state.spec.target, state.spec.alert_threshold, severity, sli)
            });
            (sli, alert)
        };

        if let Some((target, alert_threshold, severity, current_sli)) = alert {
            let alert = self.upsert_alert(name, target, alert_threshold, severity, current_sli, now);
            for observer in self.observers.read().iter() {
                observer.on_alert(&alert);
            }
        }
        Ok(sli)
    }

    /// Current SLI for an SLO; 1.0 when the window holds no measurements.
    pub fn calculate_sli(&self, name: &str) -> Result<f64> {
        let mut slos = self.slos.write();
        let state = slos
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;
        state.prune(Utc::now());
        Ok(state.sli())
    }

    /// Error-budget accounting for an SLO.
    pub fn error_budget(&self, name: &str) -> Result<ErrorBudget> {
        let mut slos = self.slos.write();
        let state = slos
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;
        state.prune(Utc::now());
        Ok(state.budget())
    }

    /// Status of one SLO.
    pub fn slo_status(&self, name: &str) -> Result<SloStatus> {
        let mut slos = self.slos.write();
        let state = slos
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;
        state.prune(Utc::now());
        Ok(state.status(name))
    }

    /// Status of every defined SLO, sorted by name.
    #[must_use]
    pub fn all_slo_status(&self) -> Vec<SloStatus> {
        let now = Utc::now();
        let mut slos = self.slos.write();
        let mut statuses: Vec<SloStatus> = slos
            .iter_mut()
            .map(|(name, state)| {
                state.prune(now);
                state.status(name)
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Alerts triggered (or re-triggered) within the last 24 hours.
    #[must_use]
    pub fn active_alerts(&self) -> Vec<Alert> {
        let cutoff = Utc::now() - alert_retention();
        let mut alerts = self.alerts.lock();
        alerts.retain(|a| a.timestamp >= cutoff);
        alerts.clone()
    }

    /// Full report: summary, per-SLO status, active alerts, and terse
    /// action hints for everything non-healthy.
    #[must_use]
    pub fn generate_report(&self) -> Report {
        let slos = self.all_slo_status();
        let summary = ReportSummary {
            total_slos: slos.len(),
            healthy: slos.iter().filter(|s| s.health == SloHealth::Healthy).count(),
            warning: slos.iter().filter(|s| s.health == SloHealth::Warning).count(),
            urgent: slos.iter().filter(|s| s.health == SloHealth::Urgent).count(),
        };
        let recommendations = slos
            .iter()
            .filter(|s| s.health != SloHealth::Healthy)
            .map(|s| Recommendation {
                slo: s.name.clone(),
                health: s.health,
                action: match s.health {
                    SloHealth::Urgent => format!(
                        "SLI {:.3} is below alert threshold; page the owning team and freeze risky changes",
                        s.current_sli
                    ),
                    SloHealth::Warning => format!(
                        "{:.0}% of the error budget is spent; slow the release cadence",
                        s.budget.error_budget_percentage
                    ),
                    SloHealth::Healthy => String::new(),
                },
            })
            .collect();
        Report {
            generated_at: Utc::now(),
            summary,
            slos,
            alerts: self.active_alerts(),
            recommendations,
        }
    }

    /// Prometheus text exposition of per-SLO gauges.
    pub fn prometheus_text(&self) -> Result<String> {
        self.gauges.text()
    }

    // ------------------------------------------------------------------
    // Convenience recorders for the standard SLO names
    // ------------------------------------------------------------------

    /// Define the standard SLO set used by the convenience recorders.
    pub fn define_default_slos(&self) -> Result<()> {
        self.define_slo(
            "availability",
            SloSpec::target(0.999)
                .alert_threshold(0.995)
                .description("Successful requests over total requests"),
        )?;
        self.define_slo(
            "deployment_success",
            SloSpec::target(0.95)
                .alert_threshold(0.90)
                .description("Deployments completing without rollback"),
        )?;
        self.define_slo(
            "test_pass_rate",
            SloSpec::target(0.99)
                .alert_threshold(0.95)
                .description("CI test runs passing"),
        )?;
        self.define_slo(
            "security_scan",
            SloSpec::target(0.98)
                .alert_threshold(0.95)
                .description("Security scans completing clean"),
        )?;
        self.define_slo(
            "response_time",
            SloSpec::target(0.95)
                .alert_threshold(0.90)
                .latency_threshold_ms(1000)
                .description("Requests answered within the latency budget"),
        )?;
        Ok(())
    }

    /// Record an availability observation.
    pub fn record_availability(&self, success: bool) -> Result<f64> {
        self.record_measurement("availability", success, None)
    }

    /// Record a deployment outcome.
    pub fn record_deployment(&self, success: bool) -> Result<f64> {
        self.record_measurement("deployment_success", success, None)
    }

    /// Record a test-run outcome.
    pub fn record_test_run(&self, success: bool) -> Result<f64> {
        self.record_measurement("test_pass_rate", success, None)
    }

    /// Record a security-scan outcome.
    pub fn record_security_scan(&self, success: bool) -> Result<f64> {
        self.record_measurement("security_scan", success, None)
    }

    /// Record a response time; success iff it is within the SLO's latency
    /// threshold.
    pub fn record_response_time(&self, ms: u64) -> Result<f64> {
        let threshold = {
            let slos = self.slos.read();
            slos.get("response_time")
                .ok_or_else(|| MonitorError::UnknownSlo("response_time".to_string()))?
                .spec
                .latency_threshold_ms
        };
        self.record_measurement(
            "response_time",
            ms <= threshold,
            Some(serde_json::json!({ "response_ms": ms })),
        )
    }

    /// Create or refresh the single active alert for an SLO.
    fn upsert_alert(
        &self,
        name: &str,
        target: f64,
        alert_threshold: f64,
        severity: AlertSeverity,
        current_sli: f64,
        now: DateTime<Utc>,
    ) -> Alert {
        let mut alerts = self.alerts.lock();
        let cutoff = now - alert_retention();
        alerts.retain(|a| a.timestamp >= cutoff);

        if let Some(existing) = alerts.iter_mut().find(|a| a.slo == name) {
            existing.current_sli = current_sli;
            existing.severity = severity;
            existing.timestamp = now;
            return existing.clone();
        }
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            slo: name.to_string(),
            severity,
            current_sli,
            target,
            alert_threshold,
            timestamp: now,
        };
        alerts.push(alert.clone());
        alert
    }
}
