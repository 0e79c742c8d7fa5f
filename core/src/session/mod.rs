//! Session record, durable storage and the registry that owns both

pub mod record;
pub mod registry;
pub mod store;

pub use record::{FlagState, SessionRecord, SessionStatus, StatusFlag};
pub use registry::SessionRegistry;
pub use store::{FileStore, KeyValueStore, MemoryStore, ATTEST_KEY_ID, SESSION_KEY};
