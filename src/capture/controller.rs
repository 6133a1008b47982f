//! Capture session lifecycle.
//!
//! A session owns two loops: the capture loop on a blocking thread and the
//! telemetry loop on the runtime. Both observe the same `watch` stop signal.
//! The capture loop owns the [`BlinkEstimator`] while it runs and hands it
//! back on exit, so blink state carries over between sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture::pipeline::process_frame;
use crate::capture::stats::{FpsTracker, FrameStats};
use crate::capture::{CaptureBackend, CaptureError, FrameReport, FrameSource};
use crate::config::CaptureConfig;
use crate::constants::{FPS_WINDOW, SNAPSHOT_TIMESTAMP_FORMAT};
use crate::detection::blink::{BlinkConfig, BlinkCounter, BlinkEstimator};
use crate::detection::landmarks::LandmarkSource;
use crate::store::Store;
use crate::tasks::TaskRegistry;
use crate::telemetry::{PerformanceSummary, Telemetry};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub running: bool,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub source: String,
    pub blink_count: u64,
    pub frames_processed: u64,
    pub fps: f64,
    pub active_tasks: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub session_id: Uuid,
    pub duration_secs: f64,
    pub blink_count: u64,
    pub frames_processed: u64,
    /// Both loops exited within the stop timeout
    pub clean: bool,
    pub summary: Option<PerformanceSummary>,
    pub summary_text: String,
}

struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    stop_tx: Arc<watch::Sender<bool>>,
    capture: JoinHandle<BlinkEstimator>,
    telemetry: JoinHandle<()>,
}

struct Inner {
    /// `None` while a capture loop holds it
    estimator: Option<BlinkEstimator>,
    session: Option<Session>,
    /// Capture loop that missed its stop deadline and still shares the counter
    detached: Option<JoinHandle<BlinkEstimator>>,
}

/// Clears the stopping flag when `stop` finishes or its future is dropped.
struct StoppingGuard<'a>(&'a AtomicBool);

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CaptureController {
    config: CaptureConfig,
    blink: BlinkConfig,
    store: Arc<Store>,
    backend: Arc<dyn CaptureBackend>,
    counter: BlinkCounter,
    stats: Arc<FrameStats>,
    telemetry: Arc<Telemetry>,
    tasks: Arc<TaskRegistry>,
    events: broadcast::Sender<FrameReport>,
    stopping: AtomicBool,
    inner: Mutex<Inner>,
}

impl CaptureController {
    pub fn new(
        config: CaptureConfig,
        blink: BlinkConfig,
        store: Arc<Store>,
        backend: Arc<dyn CaptureBackend>,
        telemetry: Arc<Telemetry>,
        stats: Arc<FrameStats>,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        let counter = BlinkCounter::new();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Mutex::new(Inner {
                estimator: Some(BlinkEstimator::with_counter(blink, counter.clone())),
                session: None,
                detached: None,
            }),
            config,
            blink,
            store,
            backend,
            counter,
            stats,
            telemetry,
            tasks,
            events,
            stopping: AtomicBool::new(false),
        }
    }

    pub async fn start(&self) -> Result<CaptureStatus, CaptureError> {
        let mut inner = self.inner.lock().await;
        self.reclaim_finished(&mut inner).await;
        if inner.session.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        if self.stopping.load(Ordering::Acquire) {
            return Err(CaptureError::Stopping);
        }
        self.reclaim_detached(&mut inner).await?;

        let (frames, landmarks) = self.backend.open()?;
        let estimator = inner
            .estimator
            .take()
            .unwrap_or_else(|| self.fresh_estimator());

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let telemetry = self.telemetry.spawn(stop_rx.clone(), self.tasks.clone());

        let ctx = LoopContext {
            frames,
            landmarks,
            stop_rx,
            stop_tx: stop_tx.clone(),
            store: self.store.clone(),
            stats: self.stats.clone(),
            events: self.events.clone(),
            tasks: self.tasks.clone(),
            target_fps: self.config.target_fps.max(1),
            snapshot_every: self.config.snapshot_every_frames.max(1),
        };
        let capture = tokio::task::spawn_blocking(move || run_capture_loop(ctx, estimator));

        let session = Session {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            stop_tx,
            capture,
            telemetry,
        };
        tracing::info!(
            session_id = %session.id,
            source = %self.backend.describe(),
            "Capture started"
        );
        inner.session = Some(session);

        Ok(self.status_locked(&inner))
    }

    /// Signal both loops and wait for them, each bounded by the stop timeout.
    ///
    /// The state lock is released while joining, so status queries are
    /// answered during a slow stop; `start` is refused until it completes.
    pub async fn stop(&self) -> Result<StopReport, CaptureError> {
        let session = {
            let mut inner = self.inner.lock().await;
            let session = inner.session.take().ok_or(CaptureError::NotRunning)?;
            self.stopping.store(true, Ordering::Release);
            session
        };
        let _stopping = StoppingGuard(&self.stopping);
        session.stop_tx.send_replace(true);

        let timeout = Duration::from_secs(self.config.stop_timeout_secs);
        let mut clean = true;

        let joined = self.join_capture(session.capture, timeout).await;
        {
            let mut inner = self.inner.lock().await;
            match joined {
                Ok(estimator) => inner.estimator = Some(estimator),
                Err(handle) => {
                    clean = false;
                    inner.detached = Some(handle);
                }
            }
        }

        let mut telemetry = session.telemetry;
        match tokio::time::timeout(timeout, &mut telemetry).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Telemetry task panicked"),
            Err(_) => {
                clean = false;
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Telemetry loop did not stop in time, aborting"
                );
                telemetry.abort();
            }
        }
        self.stats.clear_fps();

        let summary = self.telemetry.summary().await;
        let summary_text = summary
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "No data collected.".to_string());
        tracing::info!(session_id = %session.id, clean, summary = %summary_text, "Capture stopped");

        Ok(StopReport {
            session_id: session.id,
            duration_secs: session.started.elapsed().as_secs_f64(),
            blink_count: self.counter.get(),
            frames_processed: self.stats.frames_processed(),
            clean,
            summary,
            summary_text,
        })
    }

    /// Zero the blink count; eye state and cooldown are kept.
    pub fn reset(&self) -> u64 {
        self.counter.reset();
        tracing::info!("Blink count reset");
        self.counter.get()
    }

    pub async fn status(&self) -> CaptureStatus {
        let inner = self.inner.lock().await;
        self.status_locked(&inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrameReport> {
        self.events.subscribe()
    }

    pub fn counter(&self) -> &BlinkCounter {
        &self.counter
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Stop any active session; used on process shutdown.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(report) => tracing::info!(blinks = report.blink_count, "Capture stopped on shutdown"),
            Err(CaptureError::NotRunning) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to stop capture on shutdown"),
        }
    }

    fn status_locked(&self, inner: &Inner) -> CaptureStatus {
        let session = inner.session.as_ref();
        CaptureStatus {
            running: session.is_some_and(|s| !s.capture.is_finished()),
            session_id: session.map(|s| s.id),
            started_at: session.map(|s| s.started_at),
            source: self.backend.describe(),
            blink_count: self.counter.get(),
            frames_processed: self.stats.frames_processed(),
            fps: self.stats.fps(),
            active_tasks: self.tasks.active_count(),
        }
    }

    /// A session whose capture loop ended on its own (end of stream, read
    /// error) is collected here so a new one can start.
    async fn reclaim_finished(&self, inner: &mut Inner) {
        let finished = inner
            .session
            .as_ref()
            .is_some_and(|s| s.capture.is_finished());
        if !finished {
            return;
        }
        if let Some(session) = inner.session.take() {
            session.stop_tx.send_replace(true);
            let timeout = Duration::from_secs(self.config.stop_timeout_secs);
            match self.join_capture(session.capture, timeout).await {
                Ok(estimator) => inner.estimator = Some(estimator),
                Err(handle) => inner.detached = Some(handle),
            }
            if tokio::time::timeout(timeout, session.telemetry).await.is_err() {
                tracing::warn!(session_id = %session.id, "Telemetry loop did not stop in time");
            }
            tracing::debug!(session_id = %session.id, "Reclaimed finished capture session");
        }
    }

    /// A loop that exited (or panicked) yields the estimator to keep. One
    /// that missed the deadline is handed back: the blocking thread cannot
    /// be aborted and keeps counting into the shared [`BlinkCounter`] until
    /// it next checks the stop signal, so [`Self::start`] waits for it.
    async fn join_capture(
        &self,
        mut handle: JoinHandle<BlinkEstimator>,
        timeout: Duration,
    ) -> Result<BlinkEstimator, JoinHandle<BlinkEstimator>> {
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => Ok(self.estimator_from(joined)),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Capture loop did not stop in time, detaching"
                );
                Err(handle)
            }
        }
    }

    /// Collect a detached loop once it has exited; refuse while it still runs.
    async fn reclaim_detached(&self, inner: &mut Inner) -> Result<(), CaptureError> {
        let Some(handle) = inner.detached.take() else {
            return Ok(());
        };
        if !handle.is_finished() {
            inner.detached = Some(handle);
            return Err(CaptureError::Stopping);
        }
        inner.estimator = Some(self.estimator_from(handle.await));
        tracing::debug!("Reclaimed detached capture loop");
        Ok(())
    }

    fn estimator_from(
        &self,
        joined: Result<BlinkEstimator, tokio::task::JoinError>,
    ) -> BlinkEstimator {
        joined.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Capture loop panicked, eye state is reset");
            self.fresh_estimator()
        })
    }

    fn fresh_estimator(&self) -> BlinkEstimator {
        BlinkEstimator::with_counter(self.blink, self.counter.clone())
    }
}

struct LoopContext {
    frames: Box<dyn FrameSource>,
    landmarks: Box<dyn LandmarkSource>,
    stop_rx: watch::Receiver<bool>,
    stop_tx: Arc<watch::Sender<bool>>,
    store: Arc<Store>,
    stats: Arc<FrameStats>,
    events: broadcast::Sender<FrameReport>,
    tasks: Arc<TaskRegistry>,
    target_fps: u32,
    snapshot_every: u64,
}

fn run_capture_loop(mut ctx: LoopContext, mut estimator: BlinkEstimator) -> BlinkEstimator {
    let _guard = ctx.tasks.register("capture");
    let frame_budget = Duration::from_secs_f64(1.0 / f64::from(ctx.target_fps));
    let mut fps = FpsTracker::new(FPS_WINDOW);
    let mut last_frame_at: Option<Instant> = None;
    let mut processed: u64 = 0;

    loop {
        if *ctx.stop_rx.borrow() {
            tracing::debug!("Capture loop observed stop signal");
            break;
        }

        let tick = Instant::now();
        let frame = match ctx.frames.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(frames = processed, "Frame source exhausted");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame read failed, ending capture");
                break;
            }
        };

        if let Some(prev) = last_frame_at {
            fps.push(tick.duration_since(prev));
        }
        last_frame_at = Some(tick);

        let work_started = Instant::now();
        let outcome = process_frame(&mut estimator, ctx.landmarks.as_mut(), &frame);
        let latency = work_started.elapsed();
        let avg_fps = fps.average();
        ctx.stats.record_frame(latency, avg_fps);

        processed += 1;
        if processed % ctx.snapshot_every == 0 {
            record_snapshot(&ctx.store, estimator.blink_count());
        }

        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = ctx.events.send(FrameReport {
            seq: frame.seq,
            width: frame.width,
            height: frame.height,
            faces: outcome.faces,
            blinked: outcome.blinked,
            blink_count: estimator.blink_count(),
            fps: avg_fps,
            latency_us: latency.as_micros().min(u128::from(u64::MAX)) as u64,
        });

        let spent = tick.elapsed();
        if spent < frame_budget {
            std::thread::sleep(frame_budget - spent);
        }
    }

    ctx.frames.release();
    ctx.stats.clear_fps();
    ctx.stop_tx.send_replace(true);
    estimator
}

fn record_snapshot(store: &Store, blink_count: u64) {
    let timestamp = chrono::Local::now()
        .format(SNAPSHOT_TIMESTAMP_FORMAT)
        .to_string();
    match store.record_blink_snapshot(blink_count, &timestamp) {
        Ok(record) => tracing::debug!(id = record.id, blink_count, "Blink snapshot stored"),
        Err(e) => tracing::error!(error = %e, blink_count, "Failed to store blink snapshot"),
    }
}
