//! Platform attestation primitives
//!
//! The cryptography lives in the platform (secure enclave, TPM, ...). The
//! client only sees opaque key ids and blobs.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("not supported on this device")]
    Unsupported,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("attestation failed: {0}")]
    Attestation(String),

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error("device token generation failed: {0}")]
    Token(String),
}

/// Hardware-backed key attestation
#[async_trait]
pub trait PlatformAttestation: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Create a new attestation key, returning its id
    async fn generate_key(&self) -> Result<String, PlatformError>;

    /// Bind `key_id` to `client_data_hash` (SHA-256 of the challenge)
    async fn attest_key(&self, key_id: &str, client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError>;

    /// Sign `client_data_hash` (SHA-256 of the payload) with an attested key
    async fn generate_assertion(&self, key_id: &str, client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError>;
}

/// Per-device token service
#[async_trait]
pub trait DeviceCheck: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn generate_token(&self) -> Result<Vec<u8>, PlatformError>;
}

/// Stand-in for hosts without platform attestation; routes collection to the
/// reduced evidence path
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

#[async_trait]
impl PlatformAttestation for UnsupportedPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    async fn generate_key(&self) -> Result<String, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    async fn attest_key(&self, _key_id: &str, _client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    async fn generate_assertion(&self, _key_id: &str, _client_data_hash: &[u8]) -> Result<Vec<u8>, PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

#[async_trait]
impl DeviceCheck for UnsupportedPlatform {
    fn is_supported(&self) -> bool {
        false
    }

    async fn generate_token(&self) -> Result<Vec<u8>, PlatformError> {
        Err(PlatformError::Unsupported)
    }
}
