//! Prometheus exposition of per-SLO gauges.
//!
//! The monitor owns its own registry rather than the process-global one, so
//! embedders can scrape several monitors side by side. Export is text-only;
//! no push protocol or listener is prescribed here.

use crate::error::Result;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub(crate) struct SloGauges {
    registry: Registry,
    sli: GaugeVec,
    budget_remaining: GaugeVec,
}

impl SloGauges {
    // SAFETY: the gauges are registered on a freshly created private
    // registry under distinct names, which cannot collide.
    #[allow(clippy::expect_used)]
    pub(crate) fn new() -> Self {
        let registry = Registry::new();
        let sli = GaugeVec::new(
            Opts::new("ragkit_slo_sli", "Current SLI per SLO"),
            &["slo"],
        )
        .expect("valid gauge opts");
        let budget_remaining = GaugeVec::new(
            Opts::new(
                "ragkit_slo_error_budget_remaining",
                "Remaining error budget per SLO",
            ),
            &["slo"],
        )
        .expect("valid gauge opts");
        registry
            .register(Box::new(sli.clone()))
            .expect("fresh registry");
        registry
            .register(Box::new(budget_remaining.clone()))
            .expect("fresh registry");
        Self {
            registry,
            sli,
            budget_remaining,
        }
    }

    pub(crate) fn set(&self, slo: &str, sli: f64, budget_remaining: f64) {
        self.sli.with_label_values(&[slo]).set(sli);
        self.budget_remaining
            .with_label_values(&[slo])
            .set(budget_remaining);
    }

    pub(crate) fn text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::MonitorError::Metrics(e.to_string()))
    }
}
