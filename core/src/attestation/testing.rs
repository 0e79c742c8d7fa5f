//! Scriptable platform fakes for unit tests

use super::platform::{DeviceCheck, PlatformAttestation, PlatformError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub(crate) struct FakePlatform {
    pub(crate) unsupported: AtomicBool,
    pub(crate) fail_key: AtomicBool,
    pub(crate) fail_attest: AtomicBool,
    pub(crate) fail_assert: AtomicBool,
    keys_generated: AtomicUsize,
    attested: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn keys_generated(&self) -> usize {
        self.keys_generated.load(Ordering::SeqCst)
    }

    /// `(key_id, client_data_hash)` of every attest call
    pub(crate) fn attested(&self) -> Vec<(String, Vec<u8>)> {
        self.attested.lock().clone()
    }
}

#[async_trait]
impl PlatformAttestation for FakePlatform {
    fn is_supported(&self) -> bool {
        !self.unsupported.load(Ordering::SeqCst)
    }

    async fn generate_key(&self) -> Result<String, PlatformError> {
        if self.fail_key.load(Ordering::SeqCst) {
            return Err(PlatformError::KeyGeneration("keystore locked".into()));
        }
        let n = self.keys_generated.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("key-{}", n))
    }

    async fn attest_key(&self, key_id: &str, client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError> {
        self.attested
            .lock()
            .push((key_id.to_string(), client_data_hash.to_vec()));
        if self.fail_attest.load(Ordering::SeqCst) {
            return Err(PlatformError::Attestation("invalid key".into()));
        }
        Ok(format!("attestation:{}", key_id).into_bytes())
    }

    async fn generate_assertion(&self, key_id: &str, _client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError> {
        if self.fail_assert.load(Ordering::SeqCst) {
            return Err(PlatformError::Assertion("invalid key".into()));
        }
        Ok(format!("assertion:{}", key_id).into_bytes())
    }
}

pub(crate) struct FakeDeviceCheck {
    token: Option<Vec<u8>>,
}

impl FakeDeviceCheck {
    pub(crate) fn with_token(token: &[u8]) -> Self {
        Self {
            token: Some(token.to_vec()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl DeviceCheck for FakeDeviceCheck {
    fn is_supported(&self) -> bool {
        true
    }

    async fn generate_token(&self) -> Result<Vec<u8>, PlatformError> {
        self.token
            .clone()
            .ok_or_else(|| PlatformError::Token("service unavailable".into()))
    }
}
