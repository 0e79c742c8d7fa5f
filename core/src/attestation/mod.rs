//! Platform attestation and device-check

pub mod device_check;
pub mod pipeline;
pub mod platform;

#[cfg(test)]
pub(crate) mod testing;

pub use device_check::DeviceTokenProvider;
pub use pipeline::{AttestationPipeline, AttestationReport, Step};
pub use platform::{DeviceCheck, PlatformAttestation, PlatformError, UnsupportedPlatform};
