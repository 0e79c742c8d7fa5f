//! Handshake driven through a [`WebViewHost`]
//!
//! Each attempt loads the session page and waits for the page's binding
//! message. A watchdog bounds the page load; failed loads are retried a
//! fixed number of times before the host-visible error is returned.

use super::{SessionHandshake, WebViewError, WebViewHost};
use crate::config::HandshakeConfig;
use crate::environment::Environment;
use crate::error::{Result, VerisoulError};
use crate::telemetry::{MetricsRecorder, WEB_VIEW_SESSION_DURATION};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// `<base>/<env>/webview.html?project_id=..&session_id=..`
pub fn build_session_url(base: &str, env: Environment, project_id: &str, session_id: &str) -> String {
    format!(
        "{}/{}/webview.html?project_id={}&session_id={}",
        base.trim_end_matches('/'),
        env.as_str(),
        urlencoding::encode(project_id),
        urlencoding::encode(session_id)
    )
}

fn binds_session(message: &Value) -> bool {
    message.get("session_id").and_then(Value::as_str).is_some()
}

/// Drives a [`WebViewHost`] through the handshake with a per-attempt watchdog
pub struct WebViewHandshake<H: WebViewHost> {
    host: H,
    config: HandshakeConfig,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<H: WebViewHost> WebViewHandshake<H> {
    pub fn new(host: H, config: HandshakeConfig, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            host,
            config,
            metrics,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn base_url(&self, env: Environment) -> String {
        self.config
            .base_url
            .clone()
            .unwrap_or_else(|| env.webview_base_url())
    }

    /// One page load; Ok once a message carrying `session_id` arrives
    async fn attempt(&self, url: &str) -> std::result::Result<(), WebViewError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let load = self.host.load(url, tx);
        tokio::pin!(load);
        let watchdog = sleep(self.config.attempt_timeout());
        tokio::pin!(watchdog);

        let mut loaded = false;
        let mut closed = false;
        loop {
            tokio::select! {
                result = &mut load, if !loaded => {
                    result?;
                    loaded = true;
                    if closed {
                        return Err(WebViewError::Closed);
                    }
                }
                message = rx.recv(), if !closed => match message {
                    Some(message) if binds_session(&message) => return Ok(()),
                    Some(message) => warn!("[WebViewHandshake] Ignoring message without session_id: {}", message),
                    None => {
                        closed = true;
                        if loaded {
                            return Err(WebViewError::Closed);
                        }
                    }
                },
                _ = &mut watchdog, if !loaded => return Err(WebViewError::Timeout),
                else => return Err(WebViewError::Closed),
            }
        }
    }
}

#[async_trait]
impl<H: WebViewHost> SessionHandshake for WebViewHandshake<H> {
    async fn start_session(&self, env: Environment, project_id: &str, session_id: &str) -> Result<()> {
        if !self.host.is_available() {
            return Err(VerisoulError::webview_unavailable("WebView is not available"));
        }

        let url = build_session_url(&self.base_url(env), env, project_id, session_id);
        let max_retries = self.config.max_retries;
        let mut retries = 0;
        loop {
            let started = Instant::now();
            match self.attempt(&url).await {
                Ok(()) => {
                    self.metrics
                        .record_duration(WEB_VIEW_SESSION_DURATION, started.elapsed());
                    info!("[WebViewHandshake] Session {} bound", session_id);
                    return Ok(());
                }
                Err(e) if retries < max_retries => {
                    retries += 1;
                    warn!(
                        "[WebViewHandshake] Attempt failed ({}), retry {}/{}",
                        e, retries, max_retries
                    );
                }
                Err(e) => {
                    error!("[WebViewHandshake] Max retries reached: {}", e);
                    return Err(VerisoulError::session_unavailable(format!(
                        "WebView failed to load after {} retries",
                        retries
                    ))
                    .with_cause(e));
                }
            }
        }
    }
}
