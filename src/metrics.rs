//! Process-wide metrics collector. Backed by `dashmap`'s sharded map so
//! writes to different metric families never contend on one lock, without
//! hand-rolling a striping scheme.
//!
//! Grounded in `forge-runtime`'s use of `dashmap` for concurrent in-process
//! state, generalized here into explicit counter/histogram/gauge families.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_ms: AtomicU64,
    // Coarse fixed buckets (ms): <=100, <=500, <=1000, <=5000, <=30000, +inf.
    buckets: [AtomicU64; 6],
}

const BUCKET_BOUNDS_MS: [u64; 5] = [100, 500, 1000, 5000, 30_000];

impl Histogram {
    fn observe(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
        let idx = BUCKET_BOUNDS_MS.iter().position(|b| ms <= *b).unwrap_or(5);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let sum_ms = self.sum_ms.load(Ordering::Relaxed);
        let bucket_counts: [u64; 6] = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        HistogramSnapshot {
            count,
            mean_ms: if count == 0 { 0.0 } else { sum_ms as f64 / count as f64 },
            p50_ms: quantile_ms(&bucket_counts, count, 0.50),
            p95_ms: quantile_ms(&bucket_counts, count, 0.95),
            p99_ms: quantile_ms(&bucket_counts, count, 0.99),
        }
    }
}

/// Estimates the given quantile from cumulative bucket counts by linear
/// interpolation between the bucket boundaries the rank falls between.
/// Buckets are coarse, so this is an approximation, not an exact quantile —
/// adequate for dashboard trending, not SLA enforcement.
fn quantile_ms(bucket_counts: &[u64; 6], total: u64, q: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let target = (q * total as f64).ceil() as u64;
    let mut cumulative = 0u64;
    let mut lower_bound = 0u64;
    for (idx, &count) in bucket_counts.iter().enumerate() {
        let upper_bound = BUCKET_BOUNDS_MS.get(idx).copied().unwrap_or(BUCKET_BOUNDS_MS[4] * 2);
        cumulative += count;
        if cumulative >= target {
            if count == 0 {
                return upper_bound as f64;
            }
            let rank_within = target - (cumulative - count);
            let fraction = rank_within as f64 / count as f64;
            return lower_bound as f64 + fraction * (upper_bound - lower_bound) as f64;
        }
        lower_bound = upper_bound;
    }
    lower_bound as f64
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Counters, histograms, and gauges, each in its own `DashMap` shard so a
/// write to `phase2_success_total` never blocks a write to
/// `errors_total{validation_error}`.
pub struct MetricsCollector {
    counters: DashMap<String, AtomicU64>,
    histograms: DashMap<String, Histogram>,
    gauges: DashMap<String, AtomicI64>,
    started_at: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        MetricsCollector {
            counters: DashMap::new(),
            histograms: DashMap::new(),
            gauges: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn incr(&self, name: &str, by: u64) {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn observe(&self, name: &str, ms: u64) {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::default)
            .observe(ms);
    }

    pub fn histogram(&self, name: &str) -> HistogramSnapshot {
        self.histograms
            .get(name)
            .map(|h| h.snapshot())
            .unwrap_or(HistogramSnapshot { count: 0, mean_ms: 0.0, p50_ms: 0.0, p95_ms: 0.0, p99_ms: 0.0 })
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.get(name).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Records one fragment's worth of phase outcomes and element counts.
    pub fn record_fragment(&self, per_phase_success: [bool; 4], per_phase_ms: [u64; 4], persistence_ok: Option<bool>) {
        self.incr("fragments_processed_total", 1);
        for (i, (&success, &ms)) in per_phase_success.iter().zip(per_phase_ms.iter()).enumerate() {
            let phase = i + 1;
            self.incr(&format!("phase{phase}_{}_total", if success { "success" } else { "failure" }), 1);
            self.observe(&format!("phase{phase}_duration_seconds"), ms);
        }
        match persistence_ok {
            Some(true) => self.incr("persistence_success_total", 1),
            Some(false) => self.incr("persistence_failure_total", 1),
            None => {}
        }
    }

    pub fn record_error(&self, kind: &str) {
        self.incr(&format!("errors_total{{type={kind}}}"), 1);
    }

    /// Prometheus text exposition.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for entry in self.counters.iter() {
            out.push_str(&format!("{} {}\n", entry.key(), entry.value().load(Ordering::Relaxed)));
        }
        for entry in self.histograms.iter() {
            let snap = entry.value().snapshot();
            out.push_str(&format!("{}_count {}\n", entry.key(), snap.count));
            out.push_str(&format!("{}_sum {}\n", entry.key(), snap.mean_ms * snap.count as f64));
            out.push_str(&format!("{}{{quantile=\"0.5\"}} {}\n", entry.key(), snap.p50_ms));
            out.push_str(&format!("{}{{quantile=\"0.95\"}} {}\n", entry.key(), snap.p95_ms));
            out.push_str(&format!("{}{{quantile=\"0.99\"}} {}\n", entry.key(), snap.p99_ms));
        }
        for entry in self.gauges.iter() {
            out.push_str(&format!("{} {}\n", entry.key(), entry.value().load(Ordering::Relaxed)));
        }
        out.push_str(&format!("uptime_seconds {}\n", self.uptime_seconds()));
        out
    }

    /// Per-phase success rate over all recorded fragments (for the
    /// dashboard and alert rules).
    pub fn phase_success_rate(&self, phase: u8) -> f64 {
        let success = self.counter(&format!("phase{phase}_success_total"));
        let failure = self.counter(&format!("phase{phase}_failure_total"));
        let total = success + failure;
        if total == 0 {
            1.0
        } else {
            success as f64 / total as f64
        }
    }

    pub fn overall_success_rate(&self) -> f64 {
        let rates: Vec<f64> = (1..=4).map(|p| self.phase_success_rate(p)).collect();
        rates.iter().sum::<f64>() / rates.len() as f64
    }

    /// Average hourly rate of a counter since process start, for the
    /// dashboard's throughput figures. Returns 0 during the first second of
    /// uptime rather than dividing by a near-zero elapsed time.
    pub fn throughput_per_hour(&self, counter_name: &str) -> f64 {
        let elapsed_hours = self.started_at.elapsed().as_secs_f64() / 3600.0;
        if elapsed_hours <= 0.000_277 {
            return 0.0;
        }
        self.counter(counter_name) as f64 / elapsed_hours
    }

    pub fn persistence_failure_rate(&self) -> f64 {
        let success = self.counter("persistence_success_total");
        let failure = self.counter("persistence_failure_total");
        let total = success + failure;
        if total == 0 {
            0.0
        } else {
            failure as f64 / total as f64
        }
    }
}
