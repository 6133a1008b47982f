use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters written by the capture loop and read by HTTP handlers and the
/// telemetry loop.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames_processed: AtomicU64,
    fps_centi: AtomicU64,
    latency_total_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, latency: Duration, fps: f64) {
        let latency_us = latency.as_micros().min(u64::MAX as u128) as u64;
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us
            .fetch_add(latency_us, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        self.fps_centi
            .store((fps.max(0.0) * 100.0).round() as u64, Ordering::Relaxed);
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        self.fps_centi.load(Ordering::Relaxed) as f64 / 100.0
    }

    /// Mean per-frame latency (ms) since the previous call, `None` when no
    /// frame was processed in between.
    pub fn take_latency_window_ms(&self) -> Option<f64> {
        let samples = self.latency_samples.swap(0, Ordering::Relaxed);
        let total_us = self.latency_total_us.swap(0, Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        Some(total_us as f64 / samples as f64 / 1_000.0)
    }

    pub fn clear_fps(&self) {
        self.fps_centi.store(0, Ordering::Relaxed);
    }
}

/// Rolling average of instantaneous fps over the last `window` intervals.
#[derive(Debug)]
pub struct FpsTracker {
    window: usize,
    history: VecDeque<f64>,
}

impl FpsTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, interval: Duration) {
        let secs = interval.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        self.history.push_back(1.0 / secs);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
    }

    pub fn average(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}
