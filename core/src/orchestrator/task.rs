//! Handle to one background collection run

use crate::error::{ErrorCode, VerisoulError};
use futures::future::BoxFuture;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared cause of a failed handshake; every waiter gets the same one
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// How a collection run ended
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Ran to the end; individual submissions may still have failed
    Completed,
    Cancelled,
    /// The session-creation handshake did not bind the session id
    HandshakeFailed {
        code: ErrorCode,
        message: String,
        cause: Option<SharedCause>,
    },
}

impl PartialEq for TaskOutcome {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Completed, Self::Completed) | (Self::Cancelled, Self::Cancelled) => true,
            (
                Self::HandshakeFailed { code, message, .. },
                Self::HandshakeFailed {
                    code: other_code,
                    message: other_message,
                    ..
                },
            ) => code == other_code && message == other_message,
            _ => false,
        }
    }
}

impl Eq for TaskOutcome {}

impl TaskOutcome {
    pub fn handshake_failed(err: VerisoulError) -> Self {
        let code = match err.code() {
            Some(ErrorCode::WebviewUnavailable) => ErrorCode::WebviewUnavailable,
            _ => ErrorCode::SessionUnavailable,
        };
        let (message, cause) = match err {
            VerisoulError::SessionUnavailable { message, cause }
            | VerisoulError::WebviewUnavailable { message, cause } => {
                (message, cause.map(SharedCause::from))
            }
            other => (other.user_message(), Some(Arc::new(other) as SharedCause)),
        };
        Self::HandshakeFailed {
            code,
            message,
            cause,
        }
    }

    /// Host-visible error for a failed handshake
    pub fn error(&self) -> Option<VerisoulError> {
        let Self::HandshakeFailed {
            code,
            message,
            cause,
        } = self
        else {
            return None;
        };
        let err = match code {
            ErrorCode::WebviewUnavailable => VerisoulError::webview_unavailable(message.clone()),
            _ => VerisoulError::session_unavailable(message.clone()),
        };
        Some(match cause {
            Some(cause) => err.with_cause(Arc::clone(cause)),
            None => err,
        })
    }
}

/// A spawned collection run tagged with its generation
///
/// Clones share the run: any clone can await it or cancel it.
#[derive(Debug, Clone)]
pub struct CollectionTask {
    generation: u64,
    token: CancellationToken,
    outcome: watch::Receiver<Option<TaskOutcome>>,
}

impl CollectionTask {
    /// Spawn `body` on the current runtime. The body gets a child token and
    /// should check it between stages; cancelling also drops the body at its
    /// next suspension point.
    pub fn spawn<F>(generation: u64, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'static, TaskOutcome>,
    {
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let run = body(token.child_token());
        let cancelled = token.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancelled.cancelled() => TaskOutcome::Cancelled,
                outcome = run => outcome,
            };
            debug!("[CollectionTask] Generation {} finished: {:?}", generation, outcome);
            let _ = tx.send(Some(outcome));
        });

        Self {
            generation,
            token,
            outcome: rx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the run to end. A run that died without reporting counts as cancelled.
    pub async fn wait(&self) -> TaskOutcome {
        let mut outcome = self.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(done) => done.clone().unwrap_or(TaskOutcome::Cancelled),
            Err(_) => TaskOutcome::Cancelled,
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::error::Error;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let task = CollectionTask::spawn(1, |_| async { TaskOutcome::Completed }.boxed());
        assert_eq!(task.wait().await, TaskOutcome::Completed);
        assert!(task.is_finished());
        assert_eq!(task.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_body() {
        let task = CollectionTask::spawn(2, |token| {
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                assert!(!token.is_cancelled());
                TaskOutcome::Completed
            }
            .boxed()
        });
        assert!(!task.is_finished());

        task.cancel();
        assert_eq!(task.wait().await, TaskOutcome::Cancelled);
        assert!(task.is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_the_run() {
        let task = CollectionTask::spawn(3, |_| {
            async {
                TaskOutcome::HandshakeFailed {
                    code: ErrorCode::WebviewUnavailable,
                    message: "WebView is not available".into(),
                    cause: None,
                }
            }
            .boxed()
        });
        let other = task.clone();
        other.wait().await;

        let err = task.outcome().and_then(|o| o.error()).unwrap();
        assert_eq!(err.code(), Some(ErrorCode::WebviewUnavailable));
    }

    #[test]
    fn test_handshake_failure_maps_to_session_unavailable() {
        let outcome = TaskOutcome::handshake_failed(VerisoulError::session_unavailable(
            "WebView failed to load after 3 retries",
        ));
        let err = outcome.error().unwrap();
        assert_eq!(err.code(), Some(ErrorCode::SessionUnavailable));
        assert_eq!(err.user_message(), "WebView failed to load after 3 retries");
        assert!(TaskOutcome::Completed.error().is_none());
    }

    #[tokio::test]
    async fn test_handshake_cause_reaches_every_waiter() {
        let task = CollectionTask::spawn(4, |_| {
            async {
                let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "socket closed");
                TaskOutcome::handshake_failed(
                    VerisoulError::session_unavailable("WebView initialization failed").with_cause(io),
                )
            }
            .boxed()
        });
        let other = task.clone();

        for outcome in [task.wait().await, other.wait().await] {
            let err = outcome.error().unwrap();
            assert_eq!(err.code(), Some(ErrorCode::SessionUnavailable));
            assert_eq!(err.user_message(), "WebView initialization failed");
            let cause = err.source().unwrap();
            assert!(cause.to_string().contains("socket closed"));
        }
    }

    #[test]
    fn test_non_host_error_becomes_the_cause() {
        let outcome = TaskOutcome::handshake_failed(VerisoulError::InvalidConfig {
            message: "bad url".into(),
        });
        let err = outcome.error().unwrap();
        assert_eq!(err.code(), Some(ErrorCode::SessionUnavailable));
        assert!(err.source().unwrap().to_string().contains("bad url"));
    }
}
