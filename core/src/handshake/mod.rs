//! Session-creation handshake
//!
//! The backend learns about a new session id when a hosted page is loaded
//! with that id. The page answers with a message carrying `session_id` once
//! the session is bound. Everything about how the page is rendered is up to
//! the [`WebViewHost`]; [`WebViewHandshake`] owns retries and timeouts.

pub mod headless;
pub mod webview;

pub use headless::HeadlessWebViewHost;
pub use webview::{build_session_url, WebViewHandshake};

use crate::environment::Environment;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Creates (or confirms) a session id with the backend
#[async_trait]
pub trait SessionHandshake: Send + Sync {
    async fn start_session(&self, env: Environment, project_id: &str, session_id: &str) -> Result<()>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebViewError {
    #[error("page failed to load: {0}")]
    Load(String),

    #[error("page load timed out")]
    Timeout,

    #[error("page closed without binding the session")]
    Closed,
}

/// Something that can render the handshake page
#[async_trait]
pub trait WebViewHost: Send + Sync {
    fn is_available(&self) -> bool;

    /// Load `url`; resolves once the page finished loading. Messages posted by
    /// the page, before or after that point, go to `messages`.
    async fn load(&self, url: &str, messages: UnboundedSender<Value>) -> std::result::Result<(), WebViewError>;
}
