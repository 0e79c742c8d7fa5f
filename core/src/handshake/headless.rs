//! Browser-less handshake host
//!
//! Fetches the handshake page over plain HTTP. Without a script engine the
//! page cannot post its message back, so a successful page load stands in
//! for it: the session id from the URL is echoed as the binding message.

use super::{WebViewError, WebViewHost};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

pub struct HeadlessWebViewHost {
    client: Option<reqwest::Client>,
}

impl HeadlessWebViewHost {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build();
        if let Err(e) = &client {
            tracing::warn!("[HeadlessWebViewHost] HTTP client unavailable: {}", e);
        }
        Self { client: client.ok() }
    }
}

/// `session_id` query parameter of the handshake URL
fn session_id_of(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == "session_id")
        .map(|(_, value)| value.into_owned())
}

#[async_trait]
impl WebViewHost for HeadlessWebViewHost {
    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn load(&self, url: &str, messages: UnboundedSender<Value>) -> Result<(), WebViewError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WebViewError::Load("no HTTP client".into()))?;
        let parsed = Url::parse(url).map_err(|e| WebViewError::Load(e.to_string()))?;
        let session_id = session_id_of(&parsed)
            .ok_or_else(|| WebViewError::Load("handshake URL has no session_id".into()))?;

        let response = client
            .get(parsed)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebViewError::Timeout
                } else {
                    WebViewError::Load(e.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebViewError::Load(format!("HTTP {}", status)));
        }

        debug!("[HeadlessWebViewHost] Loaded handshake page for session {}", session_id);
        let _ = messages.send(json!({ "session_id": session_id }));
        Ok(())
    }
}
