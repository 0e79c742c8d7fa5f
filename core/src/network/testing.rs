//! Scripted transport for unit tests

use super::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Canned outcome for one request
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Response(HttpResponse),
    Fail(TransportError),
    /// Never completes
    Hang,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub(crate) fn json(value: serde_json::Value) -> Self {
        Reply::Response(HttpResponse::json(200, &value))
    }

    pub(crate) fn status(code: u16) -> Self {
        Reply::Response(HttpResponse::new(code, Vec::new()))
    }

    pub(crate) fn after(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }
}

/// Routes requests by URL path. One-shot replies queued with `push` are
/// consumed first, then the sticky reply set with `route` applies. Unknown
/// paths answer 404.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(&self, path: &str, reply: Reply) {
        self.sticky.lock().insert(path.to_string(), reply);
    }

    pub(crate) fn push(&self, path: &str, reply: Reply) {
        self.queued
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn next_reply(&self, path: &str) -> Reply {
        if let Some(reply) = self.queued.lock().get_mut(path).and_then(|q| q.pop_front()) {
            return reply;
        }
        self.sticky
            .lock()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Reply::status(404))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let mut reply = self.next_reply(request.path());
        loop {
            match reply {
                Reply::Response(response) => return Ok(response),
                Reply::Fail(err) => return Err(err),
                Reply::Hang => return std::future::pending().await,
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
