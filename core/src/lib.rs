//! Verisoul device-trust client core
//!
//! Establishes a durable session for a device/app install, collects device
//! evidence (system info, device-check token, platform attestation, touch and
//! motion samples) and reports it to the trust backend. Hosts talk to
//! [`SessionOrchestrator`]; everything else is a collaborator it composes.

pub mod attestation;
pub mod behavior;
pub mod config;
pub mod environment;
pub mod error;
pub mod evidence;
pub mod handshake;
pub mod network;
pub mod orchestrator;
pub mod session;
pub mod telemetry;

// Re-exports for convenience
pub use config::ClientConfig;
pub use environment::Environment;
pub use error::{ErrorCode, Result, VerisoulError};
pub use orchestrator::{SessionOrchestrator, SessionOrchestratorBuilder};
pub use session::{FileStore, MemoryStore, SessionRecord, SessionRegistry, StatusFlag};
