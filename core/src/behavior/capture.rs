//! Touch + accelerometer capture
//!
//! Motion samples arrive on the sensor's own schedule and go straight into
//! the ring buffer under the buffer lock. Touch handling reads that buffer
//! after a short settle delay, builds one upload and sends it. The session
//! lock is never involved on the sensor path.
//!
//! Capture ends after `max_sends` uploads or when the capture window
//! elapses; ending it marks `TouchDataCollection` done.

use super::ring_buffer::{MotionSample, RingBuffer};
use crate::config::BehaviorConfig;
use crate::network::dto::{AccelerometerSeries, AccelerometerUpload, TouchSample};
use crate::network::TrustApiClient;
use crate::session::{SessionRegistry, StatusFlag};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait after a touch before reading the buffer, so samples after the touch land too
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Samples within this distance of the touch are attached to it
const TOUCH_WINDOW_MS: i64 = 1000;

/// Delay before the touch-less sample sent at capture start
const INITIAL_SAMPLE_DELAY: Duration = Duration::from_secs(1);

pub type MotionSink = Arc<dyn Fn(MotionSample) + Send + Sync>;

/// Accelerometer feed
///
/// `register` hands over a sink the source calls for every reading until
/// `unregister` is called.
pub trait MotionSource: Send + Sync {
    fn is_available(&self) -> bool;
    fn register(&self, interval: Duration, sink: MotionSink);
    fn unregister(&self);
}

/// For hosts without an accelerometer; uploads carry empty sample arrays
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMotionSource;

impl MotionSource for NoMotionSource {
    fn is_available(&self) -> bool {
        false
    }

    fn register(&self, _interval: Duration, _sink: MotionSink) {}

    fn unregister(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Default)]
struct CaptureState {
    session_id: Option<String>,
    send_count: u32,
    collecting: bool,
    accelerometer_available: bool,
    queued: Vec<AccelerometerUpload>,
    window: Option<CancellationToken>,
}

pub struct BehaviorCapture {
    api: Arc<TrustApiClient>,
    registry: Arc<SessionRegistry>,
    motion: Arc<dyn MotionSource>,
    config: BehaviorConfig,
    buffer: Arc<Mutex<RingBuffer>>,
    state: Mutex<CaptureState>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl BehaviorCapture {
    pub fn new(
        api: Arc<TrustApiClient>,
        registry: Arc<SessionRegistry>,
        motion: Arc<dyn MotionSource>,
        config: BehaviorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            buffer: Arc::new(Mutex::new(RingBuffer::new(config.buffer_capacity))),
            api,
            registry,
            motion,
            config,
            state: Mutex::new(CaptureState::default()),
        })
    }

    pub fn is_collecting(&self) -> bool {
        self.state.lock().collecting
    }

    pub fn send_count(&self) -> u32 {
        self.state.lock().send_count
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().queued.len()
    }

    /// Begin capture unless touch evidence is already done for this session.
    /// Spawns the capture-window timer, so it must run inside a Tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if !self.registry.needs_submit(StatusFlag::TouchDataCollection) {
            debug!("[BehaviorCapture] Touch data already collected");
            return;
        }

        let available = self.motion.is_available();
        let token = {
            let mut state = self.state.lock();
            if state.collecting {
                return;
            }
            let token = CancellationToken::new();
            state.collecting = true;
            state.accelerometer_available = available;
            state.window = Some(token.clone());
            token
        };

        if available {
            let buffer = self.buffer.clone();
            let interval = Duration::from_millis(self.config.sample_interval_ms);
            self.motion
                .register(interval, Arc::new(move |sample| buffer.lock().push(sample)));
        } else {
            warn!("[BehaviorCapture] Accelerometer not available");
        }
        info!("[BehaviorCapture] Capture started");

        let this = self.clone();
        let window = Duration::from_secs(self.config.capture_window_secs);
        let window_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = window_token.cancelled() => {}
                _ = sleep(window) => {
                    info!("[BehaviorCapture] Capture window elapsed");
                    this.stop();
                }
            }
        });

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(INITIAL_SAMPLE_DELAY) => this.schedule_sample(None),
            }
        });
    }

    /// End capture for this session and mark touch evidence done
    pub fn stop(&self) {
        self.detach();
        self.registry.mark_done(StatusFlag::TouchDataCollection);
        info!("[BehaviorCapture] Stopped collecting data");
    }

    /// Stop sampling and pending work without marking anything done
    pub fn detach(&self) {
        let window = {
            let mut state = self.state.lock();
            state.collecting = false;
            state.window.take()
        };
        if let Some(token) = window {
            token.cancel();
        }
        self.motion.unregister();
    }

    /// Zero the send counter
    pub fn reset(&self) {
        self.state.lock().send_count = 0;
    }

    /// Bind uploads to `session_id` and flush anything queued before it was known
    pub fn set_session_id(self: &Arc<Self>, session_id: &str) {
        let queued = {
            let mut state = self.state.lock();
            state.session_id = Some(session_id.to_string());
            std::mem::take(&mut state.queued)
        };
        if queued.is_empty() {
            return;
        }
        debug!("[BehaviorCapture] Flushing {} queued samples", queued.len());
        let this = self.clone();
        tokio::spawn(async move {
            for payload in queued {
                this.deliver(payload).await;
            }
        });
    }

    /// A touch finished at `point`; it went down at `down_at_ms` (epoch ms)
    pub fn handle_touch_ended(self: &Arc<Self>, point: TouchPoint, down_at_ms: i64) {
        self.schedule_sample(Some((point, down_at_ms)));
    }

    fn schedule_sample(self: &Arc<Self>, touch: Option<(TouchPoint, i64)>) {
        let token = {
            let state = self.state.lock();
            if !state.collecting || state.send_count >= self.config.max_sends {
                return;
            }
            match &state.window {
                Some(token) => token.clone(),
                None => return,
            }
        };
        let touch_time = now_ms();

        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(SETTLE_DELAY) => {}
            }
            let payload = this.build_payload(touch, touch_time);
            this.deliver(payload).await;
        });
    }

    fn build_payload(&self, touch: Option<(TouchPoint, i64)>, touch_time: i64) -> AccelerometerUpload {
        let (available, session_id) = {
            let state = self.state.lock();
            (
                state.accelerometer_available,
                state.session_id.clone().unwrap_or_default(),
            )
        };

        let mut series = AccelerometerSeries::default();
        if available {
            let range = (touch_time - TOUCH_WINDOW_MS)..=(touch_time + TOUCH_WINDOW_MS);
            for sample in self.buffer.lock().samples_in_range(range) {
                series.timestamp.push(sample.timestamp_ms);
                series.x.push(sample.x);
                series.y.push(sample.y);
                series.z.push(sample.z);
            }
        }

        let (touch, sample_number) = match touch {
            Some((point, down_at)) => (
                TouchSample {
                    x: point.x,
                    y: point.y,
                    up_timestamp: now_ms(),
                    down_timestamp: down_at,
                },
                0,
            ),
            None => (TouchSample::default(), -1),
        };

        AccelerometerUpload {
            accelerometer: series,
            sample_number,
            touch,
            session_id,
            project_id: self.api.project_id().to_string(),
        }
    }

    /// Send one upload if a slot under `max_sends` is still free.
    /// Touch uploads are numbered by the slot they take.
    async fn deliver(&self, mut payload: AccelerometerUpload) {
        let reached = {
            let mut state = self.state.lock();
            let Some(session_id) = state.session_id.clone() else {
                debug!("[BehaviorCapture] No session yet, queueing sample");
                state.queued.push(payload);
                return;
            };
            if !state.collecting || state.send_count >= self.config.max_sends {
                debug!("[BehaviorCapture] Capture ended, dropping sample");
                return;
            }
            payload.session_id = session_id;
            if payload.sample_number >= 0 {
                payload.sample_number = state.send_count as i64;
            }
            state.send_count += 1;
            state.send_count >= self.config.max_sends
        };

        debug!(
            "[BehaviorCapture] Sending sample {} ({} readings)",
            payload.sample_number,
            payload.accelerometer.timestamp.len()
        );
        self.api.send_accelerometer_data(&payload).await;

        if reached {
            info!("[BehaviorCapture] Reached {} sends", self.config.max_sends);
            self.stop();
        }
    }
}
