//! Wire types of the trust backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{status}` acknowledgement returned by most endpoints
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    /// Case-insensitive "ok"
    pub fn is_ok(&self) -> bool {
        is_ok_status(&self.status)
    }
}

pub fn is_ok_status(status: &str) -> bool {
    status.eq_ignore_ascii_case("ok")
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// `POST /ios`
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDataRequest<'a> {
    pub session_id: &'a str,
    pub data: &'a Value,
    /// Base64 device-check token, empty when none was produced
    pub device_check: &'a str,
    pub project_id: &'a str,
}

/// `POST /attestation`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyAttestationRequest<'a> {
    pub attestation: String,
    pub challenge: &'a str,
    pub project_id: &'a str,
    pub key_id: &'a str,
}

/// `POST /assertion`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyAssertionRequest<'a> {
    pub session_id: &'a str,
    pub data: &'a AssertionRecord,
    pub project_id: &'a str,
}

/// Outbound assertion record; binary fields are base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub assertion: String,
    pub challenge: String,
    pub project_id: String,
    pub payload: String,
    pub key_id: String,
}

/// `POST /accelerometer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerUpload {
    pub accelerometer: AccelerometerSeries,
    /// `-1` marks the synthetic touch-less sample sent at capture start
    pub sample_number: i64,
    pub touch: TouchSample,
    pub session_id: String,
    pub project_id: String,
}

/// Column-oriented accelerometer samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerSeries {
    pub timestamp: Vec<i64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    pub x: f64,
    pub y: f64,
    pub up_timestamp: i64,
    pub down_timestamp: i64,
}
