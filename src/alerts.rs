//! In-process alert manager. Constructed once at startup and injected into
//! `AppState` — there is no module-level `get_alert_manager()` singleton.

use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warn,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub labels: std::collections::HashMap<String, String>,
    pub annotations: std::collections::HashMap<String, String>,
    pub active: bool,
}

pub struct AlertManager {
    alerts: Mutex<Vec<Alert>>,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertManager {
    pub fn new() -> Self {
        AlertManager { alerts: Mutex::new(Vec::new()) }
    }

    pub fn fire(&self, alert: Alert) {
        tracing::warn!(kind = %alert.kind, severity = ?alert.severity, "alert fired");
        self.alerts.lock().unwrap().push(alert);
    }

    pub fn list(&self, active_only: bool) -> Vec<Alert> {
        let alerts = self.alerts.lock().unwrap();
        alerts.iter().filter(|a| !active_only || a.active).cloned().collect()
    }

    pub fn summary(&self) -> AlertSummary {
        let alerts = self.alerts.lock().unwrap();
        let active = alerts.iter().filter(|a| a.active).count();
        let critical = alerts.iter().filter(|a| a.active && a.severity == Severity::Critical).count();
        let warn = alerts.iter().filter(|a| a.active && a.severity == Severity::Warn).count();
        AlertSummary { total: alerts.len(), active, critical, warn }
    }

    /// Evaluates the default rule set against the current metrics snapshot
    /// and circuit breaker states. Called on a tick
    /// (default every 30s) by the timer task in `pipeline-web`.
    pub fn evaluate(
        &self,
        metrics: &crate::metrics::MetricsCollector,
        breaker_open_secs: &[(&str, Option<u64>)],
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let overall = metrics.overall_success_rate();
        if overall < 0.9 {
            self.fire(Alert {
                kind: "overall_success_rate_low".into(),
                severity: Severity::Warn,
                title: "Overall phase success rate below threshold".into(),
                description: format!("overall_success_rate={overall:.3} < 0.9"),
                timestamp: now,
                labels: Default::default(),
                annotations: Default::default(),
                active: true,
            });
        }

        for phase in 1..=4u8 {
            let rate = metrics.phase_success_rate(phase);
            if rate < 0.8 {
                self.fire(Alert {
                    kind: format!("phase{phase}_success_rate_low"),
                    severity: Severity::Warn,
                    title: format!("Phase {phase} success rate below threshold"),
                    description: format!("phase{phase}_success_rate={rate:.3} < 0.8"),
                    timestamp: now,
                    labels: [("phase".to_string(), phase.to_string())].into_iter().collect(),
                    annotations: Default::default(),
                    active: true,
                });
            }
        }

        for (service, open_secs) in breaker_open_secs {
            if let Some(secs) = open_secs {
                if *secs > 60 {
                    self.fire(Alert {
                        kind: "circuit_breaker_open_too_long".into(),
                        severity: Severity::Critical,
                        title: format!("{service} circuit breaker open for {secs}s"),
                        description: format!("{service} breaker has been OPEN for {secs}s (> 60s)"),
                        timestamp: now,
                        labels: [("service".to_string(), service.to_string())].into_iter().collect(),
                        annotations: Default::default(),
                        active: true,
                    });
                }
            }
        }

        let persistence_failure_rate = metrics.persistence_failure_rate();
        if persistence_failure_rate > 0.1 {
            self.fire(Alert {
                kind: "persistence_failure_rate_high".into(),
                severity: Severity::Critical,
                title: "Persistence failure rate above threshold".into(),
                description: format!("persistence_failure_rate={persistence_failure_rate:.3} > 0.1"),
                timestamp: now,
                labels: Default::default(),
                annotations: Default::default(),
                active: true,
            });
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub active: usize,
    pub critical: usize,
    pub warn: usize,
}

/// Used only by tests that need a stable `Instant` reference for breaker
/// open-duration checks without sleeping.
pub fn elapsed_secs(since: Instant, now: Instant) -> u64 {
    now.duration_since(since).as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;

    #[test]
    fn fires_warn_when_overall_success_rate_low() {
        let metrics = MetricsCollector::new();
        metrics.incr("phase1_success_total", 1);
        metrics.incr("phase1_failure_total", 9);
        let manager = AlertManager::new();
        manager.evaluate(&metrics, &[], chrono::Utc::now());
        let summary = manager.summary();
        assert!(summary.warn >= 1);
    }

    #[test]
    fn fires_critical_when_breaker_open_too_long() {
        let metrics = MetricsCollector::new();
        let manager = AlertManager::new();
        manager.evaluate(&metrics, &[("llm", Some(90))], chrono::Utc::now());
        let summary = manager.summary();
        assert_eq!(summary.critical, 1);
    }
}
