//! Device evidence collection
//!
//! The orchestrator treats evidence as an opaque attribute map. What goes in
//! it is up to the collector; `sdk_info` is added afterwards by the caller.

pub mod sdk_info;
pub mod system;

pub use sdk_info::{SdkInfo, SdkType};
pub use system::SystemEvidenceCollector;

use async_trait::async_trait;
use serde_json::{Map, Value};

#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    /// Never fails; sections that cannot be read are omitted
    async fn collect(&self) -> Map<String, Value>;
}

/// Returns a fixed map, for hosts that gather telemetry themselves
#[derive(Debug, Clone, Default)]
pub struct StaticEvidenceCollector {
    evidence: Map<String, Value>,
}

impl StaticEvidenceCollector {
    pub fn new(evidence: Map<String, Value>) -> Self {
        Self { evidence }
    }
}

#[async_trait]
impl EvidenceCollector for StaticEvidenceCollector {
    async fn collect(&self) -> Map<String, Value> {
        self.evidence.clone()
    }
}

/// Attach SDK metadata under `sdk_info`
pub fn tag_with_sdk_info(evidence: &mut Map<String, Value>, info: &SdkInfo) {
    match serde_json::to_value(info) {
        Ok(value) => {
            evidence.insert("sdk_info".to_string(), value);
        }
        Err(e) => tracing::warn!("Failed to encode sdk_info: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_collector_and_tag() {
        let mut base = Map::new();
        base.insert("device".into(), json!({"model": "test"}));
        let mut evidence = StaticEvidenceCollector::new(base).collect().await;

        tag_with_sdk_info(&mut evidence, &SdkInfo::new(SdkType::Flutter));

        assert_eq!(evidence["device"]["model"], "test");
        assert_eq!(evidence["sdk_info"]["sdk_type"], "flutter");
    }
}
