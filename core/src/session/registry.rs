//! Session registry
//!
//! Owns every read and write of the persisted [`SessionRecord`]. All
//! mutations are fetch-modify-store units under one lock, so concurrent
//! `mark_done` calls cannot tear the record. Storage failures never
//! propagate: an unreadable record is a missing record, and the next
//! `init_session` simply creates a fresh one.

use super::record::{FlagState, SessionRecord, StatusFlag};
use super::store::{KeyValueStore, SESSION_KEY};
use crate::environment::Environment;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SessionRegistry {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Return the reusable session id for this identity, or replace the
    /// stored record with a fresh one.
    pub fn init_session(&self, project_id: &str, env: Environment, force_new: bool) -> String {
        let _guard = self.lock.lock();
        let existing = self.load();
        match existing {
            Some(record) if !force_new && !record.is_expired() && record.matches(project_id, env) => {
                info!("[SessionRegistry] Reusing session {}", record.session_id);
                record.session_id
            }
            other => {
                match other {
                    Some(record) if record.is_expired() => {
                        info!("[SessionRegistry] Session {} expired", record.session_id)
                    }
                    Some(record) if force_new => {
                        info!("[SessionRegistry] Replacing session {}", record.session_id)
                    }
                    Some(record) => info!(
                        "[SessionRegistry] Session {} belongs to another project or environment",
                        record.session_id
                    ),
                    None => {}
                }
                self.erase();
                self.create(project_id, env)
            }
        }
    }

    /// Unconditionally replace the stored record
    pub fn reinitialize_session(&self, project_id: &str, env: Environment) -> String {
        let _guard = self.lock.lock();
        self.erase();
        self.create(project_id, env)
    }

    pub fn get_session(&self) -> Option<SessionRecord> {
        let _guard = self.lock.lock();
        self.load()
    }

    pub fn session_id(&self) -> Option<String> {
        self.get_session().map(|record| record.session_id)
    }

    /// Set one flag to `Done`; no-op without a record
    pub fn mark_done(&self, flag: StatusFlag) {
        let _guard = self.lock.lock();
        let Some(mut record) = self.load() else {
            warn!("[SessionRegistry] No session to mark {} done", flag);
            return;
        };
        if record.status.get(flag) == FlagState::Done {
            return;
        }
        record.status.mark_done(flag);
        self.save(&record);
        info!("[SessionRegistry] {} done for session {}", flag, record.session_id);
    }

    /// True when there is no record, the record expired, or the flag is not yet done
    pub fn needs_submit(&self, flag: StatusFlag) -> bool {
        match self.get_session() {
            None => true,
            Some(record) if record.is_expired() => true,
            Some(record) => record.status.get(flag) != FlagState::Done,
        }
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock();
        self.erase();
    }

    // Helpers below assume the lock is held

    fn load(&self) -> Option<SessionRecord> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("[SessionRegistry] Failed to read session: {}", e);
                return None;
            }
        };
        match SessionRecord::from_json(&raw) {
            Ok(record) if !record.session_id.is_empty() => Some(record),
            Ok(_) => None,
            Err(e) => {
                warn!("[SessionRegistry] Discarding undecodable session: {}", e);
                None
            }
        }
    }

    fn save(&self, record: &SessionRecord) {
        let result = record
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|json| self.store.set(SESSION_KEY, &json));
        if let Err(e) = result {
            warn!("[SessionRegistry] Failed to save session {}: {}", record.session_id, e);
        }
    }

    fn erase(&self) {
        if let Err(e) = self.store.remove(SESSION_KEY) {
            warn!("[SessionRegistry] Failed to clear session: {}", e);
        }
    }

    fn create(&self, project_id: &str, env: Environment) -> String {
        let record = SessionRecord::create(project_id, env, Utc::now());
        info!("[SessionRegistry] Created session {}", record.session_id);
        self.save(&record);
        record.session_id
    }
}
