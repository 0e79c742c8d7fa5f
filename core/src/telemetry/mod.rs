//! Operational metrics
//!
//! Collaborators record durations through [`MetricsRecorder`]. The default
//! recorder turns every sample into a `tracing` event on the
//! `verisoul::metrics` target so any subscriber can pick them up.

use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

pub const ATTESTATION_FLOW_DURATION: &str = "attestation_flow_duration";
pub const DEVICE_TOKEN_GENERATION_TIME: &str = "device_token_generation_time";
pub const WEB_VIEW_SESSION_DURATION: &str = "web_view_session_duration";
pub const SYSTEM_INFO_COLLECTION_DURATION: &str = "system_info_collection_duration";

pub trait MetricsRecorder: Send + Sync {
    fn record(&self, name: &str, value: f64);

    fn record_duration(&self, name: &str, elapsed: Duration) {
        self.record(name, elapsed.as_secs_f64());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsRecorder for TracingMetrics {
    fn record(&self, name: &str, value: f64) {
        info!(target: "verisoul::metrics", metric = name, value, "metric");
    }
}

/// Keeps every sample; used by tests
#[derive(Debug, Default)]
pub struct MemoryMetrics {
    samples: Mutex<Vec<(String, f64)>>,
}

impl MemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<(String, f64)> {
        self.samples.lock().clone()
    }

    pub fn values(&self, name: &str) -> Vec<f64> {
        self.samples
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl MetricsRecorder for MemoryMetrics {
    fn record(&self, name: &str, value: f64) {
        self.samples.lock().push((name.to_string(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_metrics() {
        let metrics = MemoryMetrics::new();
        metrics.record_duration(ATTESTATION_FLOW_DURATION, Duration::from_millis(1500));
        metrics.record(WEB_VIEW_SESSION_DURATION, 0.25);
        assert_eq!(metrics.values(ATTESTATION_FLOW_DURATION), vec![1.5]);
        assert_eq!(metrics.samples().len(), 2);
    }
}
