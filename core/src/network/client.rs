//! Trust backend endpoints
//!
//! Thin typed wrappers over [`NetworkGateway`]. Every method inherits the
//! gateway's contract: `None` means "could not determine", not failure.

use super::dto::{
    AccelerometerUpload, AssertionRecord, ChallengeResponse, DeviceDataRequest, StatusResponse,
    VerifyAssertionRequest, VerifyAttestationRequest,
};
use super::gateway::NetworkGateway;
use super::transport::HttpMethod;
use crate::environment::Environment;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const JSON_HEADERS: &[(&str, &str)] = &[("content-type", "application/json")];

pub struct TrustApiClient {
    gateway: Arc<NetworkGateway>,
    base_url: String,
    project_id: String,
}

impl TrustApiClient {
    pub fn new(gateway: Arc<NetworkGateway>, base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    /// Client against the environment's ingest host, or `base_override` when set
    pub fn for_environment(
        gateway: Arc<NetworkGateway>,
        env: Environment,
        project_id: &str,
        base_override: Option<&str>,
    ) -> Self {
        let base = base_override
            .map(str::to_string)
            .unwrap_or_else(|| env.ingest_base_url());
        Self::new(gateway, base, project_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit the device evidence bundle; `Some(true)` iff acknowledged with "ok"
    pub async fn post_device_data(
        &self,
        session_id: &str,
        data: &Value,
        device_check: &str,
        project_id: &str,
    ) -> Option<bool> {
        info!("[TrustApiClient] Posting device data for session {}", session_id);
        let body = DeviceDataRequest {
            session_id,
            data,
            device_check,
            project_id,
        };
        let response: Option<StatusResponse> = self
            .gateway
            .request(&self.url("/ios"), HttpMethod::Post, Some(&body), JSON_HEADERS)
            .await;
        let accepted = response.map(|r| r.is_ok());
        info!("[TrustApiClient] Device data result: {:?}", accepted);
        accepted
    }

    pub async fn get_challenge(&self) -> Option<String> {
        let path = format!("/worker/challenge/{}", self.project_id);
        let response: Option<ChallengeResponse> = self
            .gateway
            .request::<_, Value>(&self.url(&path), HttpMethod::Get, None, &[])
            .await;
        response.map(|r| r.challenge)
    }

    /// Returns the backend status string
    pub async fn verify_attestation(&self, attestation: &[u8], challenge: &str, key_id: &str) -> Option<String> {
        let body = VerifyAttestationRequest {
            attestation: BASE64.encode(attestation),
            challenge,
            project_id: &self.project_id,
            key_id,
        };
        let response: Option<StatusResponse> = self
            .gateway
            .request(&self.url("/attestation"), HttpMethod::Post, Some(&body), JSON_HEADERS)
            .await;
        response.map(|r| r.status)
    }

    /// Returns the backend status string
    pub async fn verify_assertion(
        &self,
        session_id: &str,
        data: &AssertionRecord,
        project_id: &str,
    ) -> Option<String> {
        let body = VerifyAssertionRequest {
            session_id,
            data,
            project_id,
        };
        let response: Option<StatusResponse> = self
            .gateway
            .request(&self.url("/assertion"), HttpMethod::Post, Some(&body), JSON_HEADERS)
            .await;
        response.map(|r| r.status)
    }

    pub async fn send_accelerometer_data(&self, payload: &AccelerometerUpload) -> bool {
        let sent = self
            .gateway
            .request_empty(&self.url("/accelerometer"), HttpMethod::Post, Some(payload), JSON_HEADERS)
            .await;
        if !sent {
            warn!(
                "[TrustApiClient] Accelerometer sample {} was not delivered",
                payload.sample_number
            );
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::gateway::RetryConfig;
    use crate::network::testing::{Reply, ScriptedTransport};
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> TrustApiClient {
        let gateway = Arc::new(NetworkGateway::new(transport.clone(), RetryConfig::no_delay(3)));
        TrustApiClient::for_environment(gateway, Environment::Sandbox, "p1", None)
    }

    #[tokio::test]
    async fn test_post_device_data() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("/ios", Reply::json(json!({"status": "Ok"})));
        let client = client(&transport);

        let result = client
            .post_device_data("s1", &json!({"device": {"os": "linux"}}), "", "p1")
            .await;

        assert_eq!(result, Some(true));
        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://ingest.sandbox.verisoul.ai/ios");
        assert_eq!(
            request.body_json().unwrap(),
            json!({
                "session_id": "s1",
                "data": {"device": {"os": "linux"}},
                "device_check": "",
                "project_id": "p1"
            })
        );
    }

    #[tokio::test]
    async fn test_post_device_data_rejected_and_unreachable() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/ios", Reply::json(json!({"status": "error"})));
        let client = client(&transport);

        assert_eq!(client.post_device_data("s1", &json!({}), "", "p1").await, Some(false));
        transport.route("/ios", Reply::status(502));
        assert_eq!(client.post_device_data("s1", &json!({}), "", "p1").await, None);
    }

    #[tokio::test]
    async fn test_get_challenge() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("/worker/challenge/p1", Reply::json(json!({"challenge": "nonce-1"})));

        assert_eq!(client(&transport).get_challenge().await.as_deref(), Some("nonce-1"));
        assert_eq!(transport.requests()[0].body, None);
    }

    #[tokio::test]
    async fn test_verify_attestation_encodes_blob() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("/attestation", Reply::json(json!({"status": "ok"})));

        let status = client(&transport).verify_attestation(b"blob", "nonce", "key-1").await;

        assert_eq!(status.as_deref(), Some("ok"));
        assert_eq!(
            transport.requests()[0].body_json().unwrap(),
            json!({"attestation": "YmxvYg==", "challenge": "nonce", "project_id": "p1", "key_id": "key-1"})
        );
    }

    #[test]
    fn test_base_override() {
        let gateway = Arc::new(NetworkGateway::new(
            Arc::new(ScriptedTransport::new()),
            RetryConfig::default(),
        ));
        let client = TrustApiClient::for_environment(gateway, Environment::Prod, "p1", Some("http://127.0.0.1:3002/"));
        assert_eq!(client.base_url(), "http://127.0.0.1:3002");
    }
}
