use metrics::counter;
use solarscan_eye::pipeline::PipelineRun;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prediction counters, mirrored to the `metrics` recorder
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub bad_requests_total: AtomicU64,
    pub verifiable_total: AtomicU64,
    pub detections_total: AtomicU64,
    pub fallbacks_total: AtomicU64,
    pub fetch_failures_total: AtomicU64,
    pub write_failures_total: AtomicU64,
    pub inference_failures_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("solarscan_predict_requests_total").increment(1);
    }

    pub fn record_bad_request(&self) {
        self.bad_requests_total.fetch_add(1, Ordering::Relaxed);
        counter!("solarscan_bad_requests_total").increment(1);
    }

    pub fn record_run(&self, run: &PipelineRun) {
        if run.record.is_verifiable() {
            self.verifiable_total.fetch_add(1, Ordering::Relaxed);
            counter!("solarscan_verifiable_total").increment(1);
        }
        if run.detections > 0 {
            self.detections_total.fetch_add(run.detections as u64, Ordering::Relaxed);
            counter!("solarscan_detections_total").increment(run.detections as u64);
        }
        if run.fallback_used {
            self.fallbacks_total.fetch_add(1, Ordering::Relaxed);
            counter!("solarscan_provider_fallbacks_total").increment(1);
        }
        if run.fetch_failed {
            self.fetch_failures_total.fetch_add(1, Ordering::Relaxed);
            counter!("solarscan_fetch_failures_total").increment(1);
        }
        if run.write_failed {
            self.write_failures_total.fetch_add(1, Ordering::Relaxed);
            counter!("solarscan_tile_write_failures_total").increment(1);
        }
        if run.inference_failed {
            self.inference_failures_total.fetch_add(1, Ordering::Relaxed);
            counter!("solarscan_inference_failures_total").increment(1);
        }
    }

    /// Prometheus text exposition
    pub fn render(&self) -> String {
        let series: [(&str, &str, &AtomicU64); 8] = [
            ("solarscan_predict_requests_total", "Prediction requests received", &self.requests_total),
            ("solarscan_bad_requests_total", "Prediction requests rejected as invalid", &self.bad_requests_total),
            ("solarscan_verifiable_total", "Records with qc_status VERIFIABLE", &self.verifiable_total),
            ("solarscan_detections_total", "Panel boxes detected", &self.detections_total),
            ("solarscan_provider_fallbacks_total", "Tiles served by the fallback provider", &self.fallbacks_total),
            ("solarscan_fetch_failures_total", "Requests where no provider returned a tile", &self.fetch_failures_total),
            ("solarscan_tile_write_failures_total", "Fetched tiles that could not be saved", &self.write_failures_total),
            ("solarscan_inference_failures_total", "Requests where the detector failed", &self.inference_failures_total),
        ];

        let mut out = String::new();
        for (name, help, value) in series {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value.load(Ordering::Relaxed));
        }
        out
    }
}
