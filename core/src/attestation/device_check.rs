use super::platform::DeviceCheck;
use crate::telemetry::{MetricsRecorder, DEVICE_TOKEN_GENERATION_TIME};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Device-check token fetch that never fails: no token is just `None`
pub struct DeviceTokenProvider {
    device_check: Arc<dyn DeviceCheck>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl DeviceTokenProvider {
    pub fn new(device_check: Arc<dyn DeviceCheck>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            device_check,
            metrics,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.device_check.is_supported()
    }

    pub async fn token(&self) -> Option<Vec<u8>> {
        if !self.device_check.is_supported() {
            warn!("[DeviceCheck] Not supported on this device");
            return None;
        }

        let started = Instant::now();
        match self.device_check.generate_token().await {
            Ok(token) => {
                self.metrics
                    .record_duration(DEVICE_TOKEN_GENERATION_TIME, started.elapsed());
                info!("[DeviceCheck] Token generated ({} bytes)", token.len());
                Some(token)
            }
            Err(e) => {
                warn!("[DeviceCheck] {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::testing::FakeDeviceCheck;
    use crate::attestation::UnsupportedPlatform;
    use crate::telemetry::MemoryMetrics;

    #[tokio::test]
    async fn test_token_success_records_metric() {
        let metrics = Arc::new(MemoryMetrics::new());
        let provider = DeviceTokenProvider::new(Arc::new(FakeDeviceCheck::with_token(b"tok")), metrics.clone());

        assert_eq!(provider.token().await, Some(b"tok".to_vec()));
        assert_eq!(metrics.values(DEVICE_TOKEN_GENERATION_TIME).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_and_unsupported_yield_none() {
        let metrics = Arc::new(MemoryMetrics::new());
        let failing = DeviceTokenProvider::new(Arc::new(FakeDeviceCheck::failing()), metrics.clone());
        assert_eq!(failing.token().await, None);

        let unsupported = DeviceTokenProvider::new(Arc::new(UnsupportedPlatform), metrics.clone());
        assert!(!unsupported.is_supported());
        assert_eq!(unsupported.token().await, None);
        assert!(metrics.samples().is_empty());
    }
}
