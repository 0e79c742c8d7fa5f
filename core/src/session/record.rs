//! Persisted session record
//!
//! Wire format (one JSON blob under a fixed storage key):
//!
//! ```json
//! {
//!   "sessionId": "8c1e...",
//!   "expiration": 1767225600.123,
//!   "projectId": "p1",
//!   "env": "prod",
//!   "status": { "DeviceCheck": "Done", "NativeDataCollection": "Waiting", "TouchDataCollection": "Waiting" }
//! }
//! ```

use crate::environment::Environment;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How long a session stays valid after creation, in seconds
pub const SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;

pub fn session_lifetime() -> ChronoDuration {
    ChronoDuration::seconds(SESSION_LIFETIME_SECS)
}

/// Progress of one evidence stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagState {
    #[default]
    Waiting,
    Done,
}

impl FlagState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagState::Waiting => "Waiting",
            FlagState::Done => "Done",
        }
    }

    /// Unknown strings decode as `Waiting`
    pub fn from_wire(value: &str) -> Self {
        match value {
            "Done" => FlagState::Done,
            _ => FlagState::Waiting,
        }
    }
}

impl Serialize for FlagState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FlagState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(FlagState::from_wire(&raw))
    }
}

/// The three independently tracked evidence streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    DeviceCheck,
    NativeDataCollection,
    TouchDataCollection,
}

impl std::fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatusFlag::DeviceCheck => "DeviceCheck",
            StatusFlag::NativeDataCollection => "NativeDataCollection",
            StatusFlag::TouchDataCollection => "TouchDataCollection",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(rename = "DeviceCheck", default)]
    pub device_check: FlagState,
    #[serde(rename = "NativeDataCollection", default)]
    pub native_data_collection: FlagState,
    #[serde(rename = "TouchDataCollection", default)]
    pub touch_data_collection: FlagState,
}

impl SessionStatus {
    pub fn get(&self, flag: StatusFlag) -> FlagState {
        match flag {
            StatusFlag::DeviceCheck => self.device_check,
            StatusFlag::NativeDataCollection => self.native_data_collection,
            StatusFlag::TouchDataCollection => self.touch_data_collection,
        }
    }

    pub fn mark_done(&mut self, flag: StatusFlag) {
        let slot = match flag {
            StatusFlag::DeviceCheck => &mut self.device_check,
            StatusFlag::NativeDataCollection => &mut self.native_data_collection,
            StatusFlag::TouchDataCollection => &mut self.touch_data_collection,
        };
        *slot = FlagState::Done;
    }
}

/// One device's trust session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "expiration", with = "epoch_seconds")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub env: Environment,
    pub status: SessionStatus,
}

impl SessionRecord {
    /// Fresh record: new lowercase UUID, all flags waiting, 24h horizon
    pub fn create(project_id: &str, env: Environment, now: DateTime<Utc>) -> Self {
        let now = truncate_to_millis(now);
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            expires_at: now + session_lifetime(),
            project_id: project_id.to_string(),
            env,
            status: SessionStatus::default(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Unexpired and native evidence accepted: the id can be handed out
    pub fn is_ready(&self) -> bool {
        !self.is_expired() && self.status.native_data_collection == FlagState::Done
    }

    /// Reusable for the given identity
    pub fn matches(&self, project_id: &str, env: Environment) -> bool {
        !self.session_id.is_empty() && self.project_id == project_id && self.env == env
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Expiration stored as fractional epoch seconds, millisecond precision
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(at.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() {
            return Err(D::Error::custom("expiration is not a finite number"));
        }
        DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
            .ok_or_else(|| D::Error::custom("expiration out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_with(env: Environment, status: SessionStatus) -> SessionRecord {
        SessionRecord {
            session_id: "0b6a1f84-6f0e-4bde-9a8c-1f0d1c7e9a11".to_string(),
            expires_at: Utc.timestamp_millis_opt(1_767_225_600_123).unwrap(),
            project_id: "p1".to_string(),
            env,
            status,
        }
    }

    #[test]
    fn test_round_trip_preserves_env_and_flags() {
        let mut mixed = SessionStatus::default();
        mixed.mark_done(StatusFlag::NativeDataCollection);
        for (env, status) in [
            (Environment::Dev, SessionStatus::default()),
            (Environment::Staging, mixed),
            (Environment::Prod, SessionStatus {
                device_check: FlagState::Done,
                native_data_collection: FlagState::Done,
                touch_data_collection: FlagState::Done,
            }),
        ] {
            let record = record_with(env, status);
            let json = record.to_json().unwrap();
            assert_eq!(SessionRecord::from_json(&json).unwrap(), record);
        }
    }

    #[test]
    fn test_created_record_round_trips() {
        let record = SessionRecord::create("p1", Environment::Prod, Utc::now());
        let decoded = SessionRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_wire_field_names() {
        let record = record_with(Environment::Sandbox, SessionStatus::default());
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["sessionId"], "0b6a1f84-6f0e-4bde-9a8c-1f0d1c7e9a11");
        assert_eq!(value["projectId"], "p1");
        assert_eq!(value["env"], "sandbox");
        assert_eq!(value["expiration"].as_f64().unwrap(), 1_767_225_600.123);
        assert_eq!(value["status"]["DeviceCheck"], "Waiting");
        assert_eq!(value["status"]["TouchDataCollection"], "Waiting");
    }

    #[test]
    fn test_unknown_status_decodes_as_waiting() {
        let json = r#"{"sessionId":"s","expiration":1767225600,"projectId":"p","env":"dev",
            "status":{"DeviceCheck":"Pending","NativeDataCollection":"Done"}}"#;
        let record = SessionRecord::from_json(json).unwrap();
        assert_eq!(record.status.device_check, FlagState::Waiting);
        assert_eq!(record.status.native_data_collection, FlagState::Done);
        assert_eq!(record.status.touch_data_collection, FlagState::Waiting);
    }

    #[test]
    fn test_unknown_env_rejected() {
        let json = r#"{"sessionId":"s","expiration":1767225600,"projectId":"p","env":"qa","status":{}}"#;
        assert!(SessionRecord::from_json(json).is_err());
    }

    #[test]
    fn test_create() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = SessionRecord::create("p1", Environment::Prod, now);
        assert!(!record.session_id.is_empty());
        assert_eq!(record.session_id, record.session_id.to_lowercase());
        assert_eq!(record.expires_at, now + session_lifetime());
        assert_eq!(record.status, SessionStatus::default());
        assert!(record.matches("p1", Environment::Prod));
        assert!(!record.matches("p1", Environment::Dev));
        assert!(!record.matches("p2", Environment::Prod));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = SessionRecord::create("p1", Environment::Prod, now);
        assert!(!record.is_expired_at(now));
        assert!(record.is_expired_at(record.expires_at));
        assert!(record.is_expired_at(record.expires_at + ChronoDuration::seconds(1)));
    }

    #[test]
    fn test_mark_done() {
        let mut status = SessionStatus::default();
        status.mark_done(StatusFlag::TouchDataCollection);
        assert_eq!(status.get(StatusFlag::TouchDataCollection), FlagState::Done);
        assert_eq!(status.get(StatusFlag::DeviceCheck), FlagState::Waiting);
    }
}
