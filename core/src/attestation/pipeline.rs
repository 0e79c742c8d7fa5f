//! App attestation flow
//!
//! Eight linear steps; none of them can abort the chain. A failing step
//! substitutes an empty value and the record is sent with whatever the
//! other steps produced:
//!
//! 1. key id        (stored or newly generated)
//! 2. challenge     (`GET /worker/challenge/{project}`)
//! 3. attestation   (platform binds key + SHA-256(challenge))
//! 4. verification  (`POST /attestation`)
//! 5. payload       (`{"challenge": ...}` as JSON bytes)
//! 6. assertion     (platform signs SHA-256(payload))
//! 7. assemble      (record queued as the pending payload)
//! 8. send          (`POST /assertion`, needs a session id)
//!
//! Failures at steps 3 and 6 also forget the stored key id so the next run
//! starts with a fresh key.

use super::platform::PlatformAttestation;
use crate::network::dto::{is_ok_status, AssertionRecord};
use crate::network::TrustApiClient;
use crate::session::store::{KeyValueStore, ATTEST_KEY_ID};
use crate::telemetry::{MetricsRecorder, ATTESTATION_FLOW_DURATION};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one pipeline step
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Produced(T),
    Fallback { value: T, reason: String },
}

impl<T> Step<T> {
    fn fallback(value: T, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("[AttestationPipeline] Falling back: {}", reason);
        Step::Fallback { value, reason }
    }

    pub fn value(&self) -> &T {
        match self {
            Step::Produced(value) | Step::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Step::Fallback { .. })
    }
}

/// What every step produced during one `run`
#[derive(Debug, Clone)]
pub struct AttestationReport {
    pub key_id: Step<String>,
    pub challenge: Step<String>,
    pub attestation: Step<Vec<u8>>,
    pub verification: Step<String>,
    pub payload: Step<Vec<u8>>,
    pub assertion: Step<Vec<u8>>,
    pub record: AssertionRecord,
    /// Sent and acknowledged with "ok"
    pub submitted: bool,
}

impl AttestationReport {
    /// Names of the steps that used their fallback value
    pub fn degraded_steps(&self) -> Vec<&'static str> {
        [
            ("key_id", self.key_id.is_fallback()),
            ("challenge", self.challenge.is_fallback()),
            ("attestation", self.attestation.is_fallback()),
            ("verification", self.verification.is_fallback()),
            ("payload", self.payload.is_fallback()),
            ("assertion", self.assertion.is_fallback()),
        ]
        .into_iter()
        .filter(|(_, degraded)| *degraded)
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Serialize)]
struct ChallengePayload<'a> {
    challenge: &'a str,
}

type PayloadEncoder = fn(&str) -> serde_json::Result<Vec<u8>>;

fn encode_challenge_payload(challenge: &str) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&ChallengePayload { challenge })
}

#[derive(Default)]
struct PipelineState {
    session_id: Option<String>,
    pending: Option<AssertionRecord>,
}

pub struct AttestationPipeline {
    platform: Arc<dyn PlatformAttestation>,
    api: Arc<TrustApiClient>,
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<dyn MetricsRecorder>,
    encode_payload: PayloadEncoder,
    state: Mutex<PipelineState>,
}

impl AttestationPipeline {
    pub fn new(
        platform: Arc<dyn PlatformAttestation>,
        api: Arc<TrustApiClient>,
        store: Arc<dyn KeyValueStore>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            platform,
            api,
            store,
            metrics,
            encode_payload: encode_challenge_payload,
            state: Mutex::new(PipelineState::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_payload_encoder(mut self, encoder: PayloadEncoder) -> Self {
        self.encode_payload = encoder;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().session_id.clone()
    }

    pub fn pending_payload(&self) -> Option<AssertionRecord> {
        self.state.lock().pending.clone()
    }

    /// Run the full flow; true iff the assertion was sent and acknowledged
    pub async fn attest_app(&self, project_id: &str) -> bool {
        self.run(project_id).await.submitted
    }

    /// Run the full flow and report what each step produced
    pub async fn run(&self, project_id: &str) -> AttestationReport {
        info!("[AttestationPipeline] Starting attestation flow");
        let started = Instant::now();

        let key_id = self.get_key().await;
        let challenge = self.get_challenge().await;
        let attestation = self
            .generate_attestation(key_id.value(), challenge.value())
            .await;
        let verification = self
            .verify_attestation(attestation.value(), challenge.value(), key_id.value())
            .await;
        let payload = self.build_payload(challenge.value());
        let assertion = self
            .generate_assertion(key_id.value(), payload.value())
            .await;

        let record = AssertionRecord {
            assertion: BASE64.encode(assertion.value()),
            challenge: challenge.value().clone(),
            project_id: project_id.to_string(),
            payload: BASE64.encode(payload.value()),
            key_id: key_id.value().clone(),
        };
        self.state.lock().pending = Some(record.clone());

        let submitted = self.send_assertion().await;

        let elapsed = started.elapsed();
        self.metrics.record_duration(ATTESTATION_FLOW_DURATION, elapsed);

        let report = AttestationReport {
            key_id,
            challenge,
            attestation,
            verification,
            payload,
            assertion,
            record,
            submitted,
        };
        info!(
            "[AttestationPipeline] Flow finished in {:?}: submitted={}, degraded={:?}",
            elapsed,
            submitted,
            report.degraded_steps()
        );
        report
    }

    /// Bind the session id, then try to deliver whatever is already queued
    pub async fn set_session_id(&self, session_id: &str) -> bool {
        self.state.lock().session_id = Some(session_id.to_string());
        self.send_assertion().await
    }

    /// POST the pending record; false when session id or payload is missing
    pub async fn send_assertion(&self) -> bool {
        let (session_id, record) = {
            let state = self.state.lock();
            match (&state.session_id, &state.pending) {
                (Some(session_id), Some(record)) => (session_id.clone(), record.clone()),
                _ => {
                    debug!("[AttestationPipeline] Nothing to send yet");
                    return false;
                }
            }
        };

        let status = self
            .api
            .verify_assertion(&session_id, &record, self.api.project_id())
            .await;
        let acknowledged = status.as_deref().is_some_and(is_ok_status);
        info!(
            "[AttestationPipeline] Assertion for session {} acknowledged={}",
            session_id, acknowledged
        );
        acknowledged
    }

    /// Forget the stored key id and create a new key
    pub async fn rotate_key(&self) -> Option<String> {
        self.invalidate_key();
        match self.get_key().await {
            Step::Produced(key_id) => Some(key_id),
            Step::Fallback { .. } => None,
        }
    }

    fn stored_key(&self) -> Option<String> {
        match self.store.get(ATTEST_KEY_ID) {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                warn!("[AttestationPipeline] Failed to read key id: {}", e);
                None
            }
        }
    }

    fn invalidate_key(&self) {
        if let Err(e) = self.store.remove(ATTEST_KEY_ID) {
            warn!("[AttestationPipeline] Failed to forget key id: {}", e);
        }
    }

    async fn get_key(&self) -> Step<String> {
        if !self.platform.is_supported() {
            return Step::fallback(String::new(), "attestation not supported");
        }
        if let Some(key_id) = self.stored_key() {
            return Step::Produced(key_id);
        }
        match self.platform.generate_key().await {
            Ok(key_id) => {
                if let Err(e) = self.store.set(ATTEST_KEY_ID, &key_id) {
                    warn!("[AttestationPipeline] Failed to store key id: {}", e);
                }
                Step::Produced(key_id)
            }
            Err(e) => Step::fallback(String::new(), e.to_string()),
        }
    }

    async fn get_challenge(&self) -> Step<String> {
        match self.api.get_challenge().await {
            Some(challenge) => Step::Produced(challenge),
            None => Step::fallback(String::new(), "challenge unavailable"),
        }
    }

    async fn generate_attestation(&self, key_id: &str, challenge: &str) -> Step<Vec<u8>> {
        let hash = Sha256::digest(challenge.as_bytes());
        match self.platform.attest_key(key_id, &hash).await {
            Ok(blob) => Step::Produced(blob),
            Err(e) => {
                self.invalidate_key();
                Step::fallback(Vec::new(), e.to_string())
            }
        }
    }

    async fn verify_attestation(&self, blob: &[u8], challenge: &str, key_id: &str) -> Step<String> {
        match self.api.verify_attestation(blob, challenge, key_id).await {
            Some(status) => Step::Produced(status),
            None => Step::fallback(String::new(), "attestation verification unavailable"),
        }
    }

    fn build_payload(&self, challenge: &str) -> Step<Vec<u8>> {
        match (self.encode_payload)(challenge) {
            Ok(bytes) => Step::Produced(bytes),
            Err(e) => Step::fallback(Vec::new(), format!("payload encoding failed: {}", e)),
        }
    }

    async fn generate_assertion(&self, key_id: &str, payload: &[u8]) -> Step<Vec<u8>> {
        let hash = Sha256::digest(payload);
        match self.platform.generate_assertion(key_id, &hash).await {
            Ok(assertion) => Step::Produced(assertion),
            Err(e) => {
                self.invalidate_key();
                Step::fallback(Vec::new(), e.to_string())
            }
        }
    }
}
