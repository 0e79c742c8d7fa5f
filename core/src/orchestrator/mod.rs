//! Session orchestration
//!
//! [`SessionOrchestrator`] is the host-facing surface: `configure`,
//! `reinitialize` and `session`. It owns the current [`CollectionTask`] and
//! the generation counter under one lock; the registry has its own lock and
//! is always taken second.
//!
//! `session()` hands out an id within one time budget:
//! 1. a cached record that is unexpired and has native evidence accepted is
//!    returned without suspending;
//! 2. otherwise the caller attaches to the running task, starting one when
//!    evidence is still needed;
//! 3. if a newer generation replaced that task meanwhile, it re-attaches;
//! 4. finally it polls the registry until the same budget runs out.

mod builder;
pub mod collection;
pub mod task;
pub mod wait;

pub use builder::SessionOrchestratorBuilder;
pub use collection::{run_collection, CollectionContext};
pub use task::{CollectionTask, TaskOutcome};
pub use wait::WaitBudget;

use crate::attestation::{AttestationPipeline, DeviceTokenProvider, PlatformAttestation};
use crate::behavior::{BehaviorCapture, MotionSource};
use crate::config::ClientConfig;
use crate::environment::Environment;
use crate::error::{Result, VerisoulError};
use crate::evidence::{EvidenceCollector, SdkInfo};
use crate::handshake::SessionHandshake;
use crate::network::{NetworkGateway, TrustApiClient};
use crate::session::{KeyValueStore, SessionRegistry, StatusFlag};
use crate::telemetry::MetricsRecorder;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Replaces the body of collection runs
pub type TaskFactory =
    Arc<dyn Fn(CollectionContext, CancellationToken) -> BoxFuture<'static, TaskOutcome> + Send + Sync>;

/// Collaborators bound to one environment + project
struct Binding {
    env: Environment,
    project_id: String,
    /// Last id handed out by `configure`/`reinitialize`; used when the store cannot answer
    session_id: String,
    api: Arc<TrustApiClient>,
    pipeline: Arc<AttestationPipeline>,
    capture: Arc<BehaviorCapture>,
}

struct Inner {
    binding: Option<Binding>,
    task: Option<CollectionTask>,
    generation: u64,
    last_reinitialize: Option<Instant>,
    debounce: Duration,
}

impl Inner {
    fn new(debounce: Duration) -> Self {
        Self {
            binding: None,
            task: None,
            generation: 0,
            last_reinitialize: None,
            debounce,
        }
    }

    /// Running task, if any; a finished one does not count
    fn current_task(&self) -> Option<CollectionTask> {
        self.task.clone().filter(|task| !task.is_finished())
    }
}

pub struct SessionOrchestrator {
    config: ClientConfig,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn KeyValueStore>,
    gateway: Arc<NetworkGateway>,
    evidence: Arc<dyn EvidenceCollector>,
    platform: Arc<dyn PlatformAttestation>,
    device_tokens: Arc<DeviceTokenProvider>,
    handshake: Arc<dyn SessionHandshake>,
    motion: Arc<dyn MotionSource>,
    metrics: Arc<dyn MetricsRecorder>,
    task_factory: Mutex<Option<TaskFactory>>,
    inner: Mutex<Inner>,
}

impl SessionOrchestrator {
    pub fn builder() -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder::new()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn current_task(&self) -> Option<CollectionTask> {
        self.inner.lock().task.clone()
    }

    /// Touch capture for the configured project, for hosts that forward touches
    pub fn behavior_capture(&self) -> Option<Arc<BehaviorCapture>> {
        self.inner
            .lock()
            .binding
            .as_ref()
            .map(|binding| binding.capture.clone())
    }

    /// Bind to `env` + `project_id`, reuse or create the session and start a
    /// collection run. Returns the session id. Must be called inside a Tokio
    /// runtime.
    pub fn configure(&self, env: Environment, project_id: &str, reinitialize: bool) -> String {
        let mut inner = self.inner.lock();
        info!(
            "[Orchestrator] Configuring project {} in {} (reinitialize={})",
            project_id, env, reinitialize
        );

        let session_id = self.registry.init_session(project_id, env, reinitialize);
        if let Some(previous) = inner.binding.take() {
            previous.capture.detach();
        }
        let binding = self.bind(env, project_id, &session_id);
        binding.capture.set_session_id(&session_id);
        binding.capture.start();
        inner.binding = Some(binding);

        self.start_task(&mut inner, session_id.clone());
        session_id
    }

    /// Replace the session and restart collection. Calls within the debounce
    /// interval of the previous effective call are ignored; returns whether
    /// this call took effect.
    pub fn reinitialize(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if let Some(last) = inner.last_reinitialize {
            if now.duration_since(last) < inner.debounce {
                info!("[Orchestrator] Reinitialize debounced");
                return false;
            }
        }
        let Some((env, project_id)) = inner
            .binding
            .as_ref()
            .map(|binding| (binding.env, binding.project_id.clone()))
        else {
            warn!("[Orchestrator] Reinitialize before configure, ignoring");
            return false;
        };
        inner.last_reinitialize = Some(now);

        if let Some(task) = inner.task.take() {
            task.cancel();
            info!("[Orchestrator] Cancelled generation {}", task.generation());
        }

        let session_id = self.registry.reinitialize_session(&project_id, env);
        if let Some(binding) = inner.binding.as_mut() {
            binding.session_id = session_id.clone();
            binding.capture.reset();
            binding.capture.set_session_id(&session_id);
            binding.capture.start();
        }

        self.start_task(&mut inner, session_id);
        true
    }

    /// Session id, waiting at most `timing.session_timeout_secs` for
    /// collection to finish
    pub async fn session(&self) -> Result<String> {
        debug!("[Orchestrator] Retrieving session id");
        if let Some(session_id) = self.ready_session_id() {
            info!("[Orchestrator] Session {} served from cache", session_id);
            return Ok(session_id);
        }

        let budget = WaitBudget::start(self.config.timing.session_timeout());
        loop {
            let (task, generation) = self.attach();
            let Some(task) = task else {
                break;
            };

            info!(
                "[Orchestrator] Awaiting collection (generation {})",
                task.generation()
            );
            let Some(outcome) = budget.run(task.wait()).await else {
                task.cancel();
                error!(
                    "[Orchestrator] Collection timed out after {:?}",
                    budget.total()
                );
                return Err(VerisoulError::session_timeout(budget.total()));
            };

            if let Some(session_id) = self.ready_session_id() {
                info!("[Orchestrator] Session {} ready after collection", session_id);
                return Ok(session_id);
            }
            if self.generation() != generation {
                debug!("[Orchestrator] Newer generation started, re-attaching");
                continue;
            }
            if let Some(err) = outcome.error() {
                error!("[Orchestrator] Collection failed: {}", err);
                return Err(err);
            }
            break;
        }

        info!("[Orchestrator] No active collection, polling for session");
        match budget
            .poll(self.config.timing.poll_interval(), || self.ready_session_id())
            .await
        {
            Some(session_id) => {
                info!("[Orchestrator] Session {} ready after polling", session_id);
                Ok(session_id)
            }
            None => {
                error!(
                    "[Orchestrator] No session within {:?}",
                    budget.total()
                );
                Err(VerisoulError::session_timeout(budget.total()))
            }
        }
    }

    /// Cancel the running task and stop touch capture
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.task.take() {
            task.cancel();
        }
        if let Some(binding) = inner.binding.as_ref() {
            binding.capture.detach();
        }
        info!("[Orchestrator] Shut down");
    }

    /// Replace the body of future collection runs
    pub fn set_task_factory(&self, factory: TaskFactory) {
        *self.task_factory.lock() = Some(factory);
    }

    pub fn set_debounce_interval(&self, interval: Duration) {
        self.inner.lock().debounce = interval;
    }

    /// Let the next `reinitialize` through regardless of timing
    pub fn reset_debounce(&self) {
        self.inner.lock().last_reinitialize = None;
    }

    fn ready_session_id(&self) -> Option<String> {
        self.registry
            .get_session()
            .filter(|record| record.is_ready())
            .map(|record| record.session_id)
    }

    /// Current task (starting one if evidence is still needed) and the generation seen
    fn attach(&self) -> (Option<CollectionTask>, u64) {
        let mut inner = self.inner.lock();
        let task = match inner.current_task() {
            Some(task) => Some(task),
            None if self.registry.needs_submit(StatusFlag::NativeDataCollection) => {
                info!("[Orchestrator] Session missing or stale, starting collection");
                let session_id = self.registry.session_id().or_else(|| {
                    inner
                        .binding
                        .as_ref()
                        .map(|binding| binding.session_id.clone())
                });
                match session_id {
                    Some(session_id) => self.start_task(&mut inner, session_id),
                    None => None,
                }
            }
            None => None,
        };
        (task, inner.generation)
    }

    fn bind(&self, env: Environment, project_id: &str, session_id: &str) -> Binding {
        let api = Arc::new(TrustApiClient::for_environment(
            self.gateway.clone(),
            env,
            project_id,
            self.config.network.ingest_base_url.as_deref(),
        ));
        let pipeline = Arc::new(AttestationPipeline::new(
            self.platform.clone(),
            api.clone(),
            self.store.clone(),
            self.metrics.clone(),
        ));
        let capture = BehaviorCapture::new(
            api.clone(),
            self.registry.clone(),
            self.motion.clone(),
            self.config.behavior.clone(),
        );
        Binding {
            env,
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
            api,
            pipeline,
            capture,
        }
    }

    /// Spawn the next generation for `session_id`, cancelling whatever ran before
    fn start_task(&self, inner: &mut Inner, session_id: String) -> Option<CollectionTask> {
        let ctx = {
            let Some(binding) = inner.binding.as_ref() else {
                warn!("[Orchestrator] Not configured, cannot start collection");
                return None;
            };
            CollectionContext {
                generation: inner.generation + 1,
                session_id,
                env: binding.env,
                project_id: binding.project_id.clone(),
                registry: self.registry.clone(),
                api: binding.api.clone(),
                pipeline: binding.pipeline.clone(),
                evidence: self.evidence.clone(),
                device_tokens: self.device_tokens.clone(),
                handshake: self.handshake.clone(),
                sdk_info: SdkInfo::new(self.config.sdk_type),
                handshake_timeout: self.config.timing.session_timeout(),
            }
        };

        if let Some(previous) = inner.task.take() {
            previous.cancel();
        }
        inner.generation = ctx.generation;

        let factory = self.task_factory.lock().clone();
        let task = CollectionTask::spawn(ctx.generation, move |token| match factory {
            Some(factory) => factory(ctx, token),
            None => run_collection(ctx, token).boxed(),
        });
        info!("[Orchestrator] Started generation {}", task.generation());
        inner.task = Some(task.clone());
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::testing::{FakeDeviceCheck, FakePlatform};
    use crate::config::BehaviorConfig;
    use crate::error::ErrorCode;
    use crate::evidence::StaticEvidenceCollector;
    use crate::network::testing::{Reply, ScriptedTransport};
    use crate::session::{FlagState, MemoryStore};
    use crate::telemetry::MemoryMetrics;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::sleep;

    struct FakeHandshake {
        failure: Option<ErrorCode>,
    }

    #[async_trait]
    impl SessionHandshake for FakeHandshake {
        async fn start_session(&self, _env: Environment, _project_id: &str, _session_id: &str) -> Result<()> {
            match self.failure {
                None => Ok(()),
                Some(ErrorCode::WebviewUnavailable) => {
                    Err(VerisoulError::webview_unavailable("WebView is not available"))
                }
                Some(_) => Err(VerisoulError::session_unavailable(
                    "WebView failed to load after 3 retries",
                )),
            }
        }
    }

    fn ok_transport() -> Arc<ScriptedTransport> {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route("/ios", Reply::json(json!({"status": "ok"})));
        transport.route("/worker/challenge/p1", Reply::json(json!({"challenge": "c1"})));
        transport.route("/attestation", Reply::json(json!({"status": "ok"})));
        transport.route("/assertion", Reply::json(json!({"status": "ok"})));
        transport.route("/accelerometer", Reply::status(200));
        transport
    }

    struct Setup {
        store: Arc<MemoryStore>,
        transport: Arc<ScriptedTransport>,
        supported: bool,
        handshake_failure: Option<ErrorCode>,
        config: ClientConfig,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                transport: ok_transport(),
                supported: true,
                handshake_failure: None,
                config: ClientConfig::default(),
            }
        }

        fn build(self) -> (Arc<SessionOrchestrator>, Arc<ScriptedTransport>) {
            let builder = SessionOrchestrator::builder()
                .with_config(self.config)
                .with_store(self.store)
                .with_transport(self.transport.clone())
                .with_evidence(Arc::new(StaticEvidenceCollector::default()))
                .with_handshake(Arc::new(FakeHandshake {
                    failure: self.handshake_failure,
                }))
                .with_metrics(Arc::new(MemoryMetrics::new()));
            let builder = if self.supported {
                builder
                    .with_platform(Arc::new(FakePlatform::new()))
                    .with_device_check(Arc::new(FakeDeviceCheck::with_token(b"dc")))
            } else {
                builder
            };
            (Arc::new(builder.build().unwrap()), self.transport)
        }
    }

    #[tokio::test]
    async fn test_ready_session_is_served_without_network() {
        let setup = Setup::new();
        let registry = SessionRegistry::new(setup.store.clone());
        let session_id = registry.init_session("p1", Environment::Prod, false);
        registry.mark_done(StatusFlag::NativeDataCollection);
        let (orchestrator, transport) = setup.build();

        assert_eq!(orchestrator.session().await.unwrap(), session_id);
        assert!(transport.requests().is_empty());
        assert_eq!(orchestrator.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_collection_marks_every_flag() {
        let mut setup = Setup::new();
        setup.config.behavior = BehaviorConfig {
            max_sends: 1,
            ..BehaviorConfig::default()
        };
        let (orchestrator, transport) = setup.build();

        let session_id = orchestrator.configure(Environment::Prod, "p1", false);
        assert_eq!(orchestrator.generation(), 1);
        assert_eq!(orchestrator.session().await.unwrap(), session_id);
        assert!(!orchestrator.registry().needs_submit(StatusFlag::DeviceCheck));

        // the touch-less sample at start fills the single send
        sleep(Duration::from_secs(3)).await;
        let record = orchestrator.registry().get_session().unwrap();
        assert_eq!(record.status.native_data_collection, FlagState::Done);
        assert_eq!(record.status.device_check, FlagState::Done);
        assert_eq!(record.status.touch_data_collection, FlagState::Done);
        assert_eq!(transport.count("/ios"), 1);
        assert_eq!(transport.count("/assertion"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_platform_takes_reduced_path() {
        let mut setup = Setup::new();
        setup.supported = false;
        let (orchestrator, transport) = setup.build();

        let session_id = orchestrator.configure(Environment::Prod, "p1", false);

        assert_eq!(orchestrator.session().await.unwrap(), session_id);
        assert_eq!(transport.count("/attestation"), 0);
        assert!(orchestrator.registry().needs_submit(StatusFlag::DeviceCheck));
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_submission_times_out() {
        let setup = Setup::new();
        setup.transport.route("/ios", Reply::Hang);
        let (orchestrator, _) = setup.build();
        orchestrator.configure(Environment::Prod, "p1", false);
        let started = Instant::now();

        let err = orchestrator.session().await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::SessionUnavailable));
        assert_eq!(err.user_message(), "Session ID retrieval timed out after 20 seconds");
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
        assert!(orchestrator.current_task().unwrap().is_cancelled());
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_failure_is_surfaced() {
        let mut setup = Setup::new();
        setup.handshake_failure = Some(ErrorCode::WebviewUnavailable);
        let (orchestrator, transport) = setup.build();
        orchestrator.configure(Environment::Prod, "p1", false);
        let started = Instant::now();

        let err = orchestrator.session().await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::WebviewUnavailable));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.count("/ios"), 0);
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinitialize_is_debounced() {
        let (orchestrator, _) = Setup::new().build();
        let original = orchestrator.configure(Environment::Prod, "p1", false);

        assert!(orchestrator.reinitialize());
        let first = orchestrator.registry().session_id().unwrap();
        assert_ne!(first, original);
        assert_eq!(orchestrator.generation(), 2);

        assert!(!orchestrator.reinitialize());
        assert_eq!(orchestrator.registry().session_id().unwrap(), first);
        assert_eq!(orchestrator.generation(), 2);

        sleep(Duration::from_millis(1100)).await;
        assert!(orchestrator.reinitialize());
        assert_ne!(orchestrator.registry().session_id().unwrap(), first);
        assert_eq!(orchestrator.generation(), 3);

        orchestrator.set_debounce_interval(Duration::from_secs(60));
        assert!(!orchestrator.reinitialize());
        orchestrator.reset_debounce();
        assert!(orchestrator.reinitialize());
        assert_eq!(orchestrator.generation(), 4);
        orchestrator.shutdown();
    }

    #[tokio::test]
    async fn test_reinitialize_before_configure_is_ignored() {
        let (orchestrator, _) = Setup::new().build();
        assert!(!orchestrator.reinitialize());
        assert_eq!(orchestrator.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_reattaches_to_newer_generation() {
        let (orchestrator, _) = Setup::new().build();
        orchestrator.set_task_factory(Arc::new(|ctx: CollectionContext, _token: CancellationToken| {
            async move {
                if ctx.generation == 1 {
                    std::future::pending::<()>().await;
                }
                ctx.registry.mark_done(StatusFlag::NativeDataCollection);
                TaskOutcome::Completed
            }
            .boxed()
        }));
        orchestrator.configure(Environment::Prod, "p1", false);

        let waiter = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.session().await })
        };
        sleep(Duration::from_secs(2)).await;
        assert!(!waiter.is_finished());

        assert!(orchestrator.reinitialize());
        let replaced = orchestrator.registry().session_id().unwrap();
        let started = Instant::now();

        assert_eq!(waiter.await.unwrap().unwrap(), replaced);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(orchestrator.generation(), 2);
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_starts_collection_when_none_running() {
        let setup = Setup::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (orchestrator, _) = setup.build();
        let seen = calls.clone();
        orchestrator.set_task_factory(Arc::new(move |ctx: CollectionContext, _token: CancellationToken| {
            let attempt = seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if attempt > 0 {
                    ctx.registry.mark_done(StatusFlag::NativeDataCollection);
                }
                TaskOutcome::Completed
            }
            .boxed()
        }));
        let session_id = orchestrator.configure(Environment::Prod, "p1", false);
        orchestrator.current_task().unwrap().wait().await;

        // first run finished without submitting; session() starts another
        assert_eq!(orchestrator.session().await.unwrap(), session_id);
        assert_eq!(orchestrator.generation(), 2);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        orchestrator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_session_times_out_after_polling() {
        let (orchestrator, _) = Setup::new().build();
        let started = Instant::now();

        let err = orchestrator.session().await.unwrap_err();

        assert_eq!(err.code(), Some(ErrorCode::SessionUnavailable));
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_reuses_matching_session() {
        let (orchestrator, _) = Setup::new().build();

        let first = orchestrator.configure(Environment::Prod, "p1", false);
        let second = orchestrator.configure(Environment::Prod, "p1", false);
        let forced = orchestrator.configure(Environment::Prod, "p1", true);
        let other = orchestrator.configure(Environment::Dev, "p1", false);

        assert_eq!(first, second);
        assert_ne!(second, forced);
        assert_ne!(forced, other);
        assert_eq!(orchestrator.generation(), 4);
        orchestrator.shutdown();
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> std::io::Result<Option<String>> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }

        fn set(&self, _key: &str, _value: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }

        fn remove(&self, _key: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_advances_when_store_fails() {
        let orchestrator = SessionOrchestrator::builder()
            .with_store(Arc::new(FailingStore))
            .with_transport(ok_transport())
            .with_evidence(Arc::new(StaticEvidenceCollector::default()))
            .with_handshake(Arc::new(FakeHandshake { failure: None }))
            .with_metrics(Arc::new(MemoryMetrics::new()))
            .build()
            .unwrap();

        let first = orchestrator.configure(Environment::Prod, "p1", false);
        assert!(!first.is_empty());
        assert_eq!(orchestrator.generation(), 1);
        assert_eq!(orchestrator.current_task().unwrap().generation(), 1);

        assert!(orchestrator.reinitialize());
        assert_eq!(orchestrator.generation(), 2);
        assert_eq!(orchestrator.current_task().unwrap().generation(), 2);
        orchestrator.shutdown();
    }
}
