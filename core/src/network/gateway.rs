//! Retrying request executor
//!
//! Every backend call goes through [`NetworkGateway`]. A request is re-issued
//! unchanged after a transport failure, a non-2xx status or an undecodable
//! body, up to `max_attempts` in total. Once attempts run out the failure is
//! logged and the caller gets `None`: "could not determine", never an error.

use super::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::config::NetworkConfig;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    /// Add up to 25% random spread on top of each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_network(config: &NetworkConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
            ..Self::default()
        }
    }

    /// Same attempt budget, no waiting between attempts
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            exponential_base: 2.0,
            jitter: false,
        }
    }

    /// Calculate delay before retry number `retry` (1-based)
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::from_millis(0);
        }

        let delay = self.base_delay_ms as f64 * self.exponential_base.powi(retry as i32 - 1);
        let delay = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay)
    }

    fn delay_with_jitter(&self, retry: u32) -> Duration {
        let delay = self.delay_for_attempt(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() as u64 / 4).max(1);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

pub struct NetworkGateway {
    transport: Arc<dyn HttpTransport>,
    retry: RetryConfig,
}

impl NetworkGateway {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Issue a request and decode a JSON body into `T`
    pub async fn request<T, P>(
        &self,
        url: &str,
        method: HttpMethod,
        params: Option<&P>,
        headers: &[(&str, &str)],
    ) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let request = build_request(url, method, params, headers)?;
        self.execute_with_retry(&request, |response| {
            serde_json::from_slice::<T>(&response.body).map_err(|e| format!("decode failed: {}", e))
        })
        .await
    }

    /// Issue a request whose response body is ignored; returns whether it succeeded
    pub async fn request_empty<P>(
        &self,
        url: &str,
        method: HttpMethod,
        params: Option<&P>,
        headers: &[(&str, &str)],
    ) -> bool
    where
        P: Serialize + ?Sized,
    {
        let Some(request) = build_request(url, method, params, headers) else {
            return false;
        };
        self.execute_with_retry(&request, |_| Ok(()))
            .await
            .is_some()
    }

    async fn execute_with_retry<T, F>(&self, request: &HttpRequest, decode: F) -> Option<T>
    where
        F: Fn(&HttpResponse) -> Result<T, String>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        debug!("[NetworkGateway] {} {}", request.method, request.url);

        for attempt in 1..=max_attempts {
            let failure = match self.transport.execute(request).await {
                Ok(response) if response.is_success() => match decode(&response) {
                    Ok(value) => {
                        debug!(
                            "[NetworkGateway] {} {} -> {}",
                            request.method, request.url, response.status
                        );
                        return Some(value);
                    }
                    Err(reason) => reason,
                },
                Ok(response) => format!("bad server response {}", response.status),
                Err(e) => e.to_string(),
            };

            if attempt < max_attempts {
                let delay = self.retry.delay_with_jitter(attempt);
                warn!(
                    "[NetworkGateway] {} {} failed ({}), retry {}/{} in {:?}",
                    request.method,
                    request.url,
                    failure,
                    attempt,
                    max_attempts - 1,
                    delay
                );
                sleep(delay).await;
            } else {
                error!(
                    "[NetworkGateway] {} {} failed after {} attempts: {}",
                    request.method, request.url, max_attempts, failure
                );
            }
        }
        None
    }
}

fn build_request<P>(
    url: &str,
    method: HttpMethod,
    params: Option<&P>,
    headers: &[(&str, &str)],
) -> Option<HttpRequest>
where
    P: Serialize + ?Sized,
{
    let mut request = HttpRequest::new(method, url);
    request.headers = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    if let Some(params) = params {
        match serde_json::to_vec(params) {
            Ok(body) => request.body = Some(body),
            Err(e) => {
                error!("[NetworkGateway] Failed to encode parameters for {}: {}", url, e);
                return None;
            }
        }
    }
    Some(request)
}
