//! Orchestrator Builder
//!
//! Every collaborator is injectable; anything left unset gets the default a
//! desktop host would use.
//!
//! # Example
//! ```ignore
//! use verisoul_core::orchestrator::SessionOrchestrator;
//! use verisoul_core::session::FileStore;
//! use std::sync::Arc;
//!
//! let orchestrator = SessionOrchestrator::builder()
//!     .with_store(Arc::new(FileStore::new("/tmp/verisoul.json")))
//!     .build()?;
//! ```

use super::SessionOrchestrator;
use crate::attestation::{DeviceCheck, DeviceTokenProvider, PlatformAttestation, UnsupportedPlatform};
use crate::behavior::{MotionSource, NoMotionSource};
use crate::config::ClientConfig;
use crate::error::{Result, VerisoulError};
use crate::evidence::{EvidenceCollector, SystemEvidenceCollector};
use crate::handshake::{HeadlessWebViewHost, SessionHandshake, WebViewHandshake};
use crate::network::{HttpTransport, NetworkGateway, ReqwestTransport, RetryConfig};
use crate::session::{KeyValueStore, MemoryStore, SessionRegistry};
use crate::telemetry::{MetricsRecorder, TracingMetrics};
use std::sync::Arc;

#[derive(Default)]
pub struct SessionOrchestratorBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
    evidence: Option<Arc<dyn EvidenceCollector>>,
    platform: Option<Arc<dyn PlatformAttestation>>,
    device_check: Option<Arc<dyn DeviceCheck>>,
    handshake: Option<Arc<dyn SessionHandshake>>,
    motion: Option<Arc<dyn MotionSource>>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
}

impl SessionOrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable storage for the session record and key id (default: in memory)
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_evidence(mut self, evidence: Arc<dyn EvidenceCollector>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn PlatformAttestation>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_device_check(mut self, device_check: Arc<dyn DeviceCheck>) -> Self {
        self.device_check = Some(device_check);
        self
    }

    pub fn with_handshake(mut self, handshake: Arc<dyn SessionHandshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    pub fn with_motion(mut self, motion: Arc<dyn MotionSource>) -> Self {
        self.motion = Some(motion);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fails only when the default HTTP transport cannot be created
    pub fn build(self) -> Result<SessionOrchestrator> {
        let config = self.config;
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(TracingMetrics) as Arc<dyn MetricsRecorder>);

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let transport = ReqwestTransport::new(config.network.request_timeout()).map_err(|e| {
                    VerisoulError::InvalidConfig {
                        message: format!("HTTP transport: {}", e),
                    }
                })?;
                Arc::new(transport)
            }
        };
        let gateway = Arc::new(NetworkGateway::new(
            transport,
            RetryConfig::from_network(&config.network),
        ));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let evidence = self.evidence.unwrap_or_else(|| {
            Arc::new(SystemEvidenceCollector::new(metrics.clone())) as Arc<dyn EvidenceCollector>
        });
        let platform = self
            .platform
            .unwrap_or_else(|| Arc::new(UnsupportedPlatform) as Arc<dyn PlatformAttestation>);
        let device_check = self
            .device_check
            .unwrap_or_else(|| Arc::new(UnsupportedPlatform) as Arc<dyn DeviceCheck>);
        let handshake = self.handshake.unwrap_or_else(|| {
            Arc::new(WebViewHandshake::new(
                HeadlessWebViewHost::new(config.handshake.attempt_timeout()),
                config.handshake.clone(),
                metrics.clone(),
            )) as Arc<dyn SessionHandshake>
        });
        let motion = self
            .motion
            .unwrap_or_else(|| Arc::new(NoMotionSource) as Arc<dyn MotionSource>);

        Ok(SessionOrchestrator {
            registry: Arc::new(SessionRegistry::new(store.clone())),
            device_tokens: Arc::new(DeviceTokenProvider::new(device_check, metrics.clone())),
            store,
            gateway,
            evidence,
            platform,
            handshake,
            motion,
            metrics,
            inner: parking_lot::Mutex::new(super::Inner::new(config.timing.reinitialize_debounce())),
            task_factory: parking_lot::Mutex::new(None),
            config,
        })
    }
}
