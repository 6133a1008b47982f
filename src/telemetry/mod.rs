//! Process performance telemetry.
//!
//! While a capture session is active, a tokio task samples CPU and memory
//! once per interval. Samples go into a bounded ring buffer and are
//! appended to a CSV log (truncated when the loop starts).

pub mod probe;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::FrameStats;
use crate::config::TelemetryConfig;
use crate::constants::{BYTES_PER_MB, TELEMETRY_LOG_HEADER};
use crate::tasks::TaskRegistry;

pub use probe::{ProcessProbe, ProcessUsage, SysinfoProbe};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("process information unavailable: {0}")]
    ProcessUnavailable(String),
    #[error("telemetry log io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProbeFactory =
    Arc<dyn Fn() -> Result<Box<dyn ProcessProbe>, TelemetryError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    /// Unix time in seconds
    pub time: f64,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub memory_percent: f64,
    /// Mean frame processing latency over the interval
    pub latency_ms: Option<f64>,
}

impl ResourceSample {
    pub fn to_log_row(&self) -> String {
        let latency = self
            .latency_ms
            .map(|l| format!("{l:.2}"))
            .unwrap_or_default();
        format!(
            "{:.3},{:.1},{:.2},{:.2},{}",
            self.time, self.cpu_percent, self.memory_mb, self.memory_percent, latency
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub samples: usize,
    pub avg_cpu_percent: f64,
    pub peak_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub avg_memory_percent: f64,
    pub peak_memory_percent: f64,
    pub avg_latency_ms: Option<f64>,
    pub peak_latency_ms: Option<f64>,
}

impl PerformanceSummary {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a ResourceSample>) -> Option<Self> {
        let mut count = 0usize;
        let (mut cpu_sum, mut cpu_peak) = (0.0_f64, f64::MIN);
        let (mut mem_sum, mut mem_peak) = (0.0_f64, f64::MIN);
        let (mut pct_sum, mut pct_peak) = (0.0_f64, f64::MIN);
        let (mut lat_sum, mut lat_peak, mut lat_count) = (0.0_f64, f64::MIN, 0usize);

        for s in samples {
            count += 1;
            let cpu = f64::from(s.cpu_percent);
            cpu_sum += cpu;
            cpu_peak = cpu_peak.max(cpu);
            mem_sum += s.memory_mb;
            mem_peak = mem_peak.max(s.memory_mb);
            pct_sum += s.memory_percent;
            pct_peak = pct_peak.max(s.memory_percent);
            if let Some(lat) = s.latency_ms {
                lat_count += 1;
                lat_sum += lat;
                lat_peak = lat_peak.max(lat);
            }
        }

        if count == 0 {
            return None;
        }
        let n = count as f64;
        let (avg_latency_ms, peak_latency_ms) = if lat_count > 0 {
            (Some(lat_sum / lat_count as f64), Some(lat_peak))
        } else {
            (None, None)
        };

        Some(Self {
            samples: count,
            avg_cpu_percent: cpu_sum / n,
            peak_cpu_percent: cpu_peak,
            avg_memory_mb: mem_sum / n,
            peak_memory_mb: mem_peak,
            avg_memory_percent: pct_sum / n,
            peak_memory_percent: pct_peak,
            avg_latency_ms,
            peak_latency_ms,
        })
    }
}

impl fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Average Process CPU Usage: {:.2}%", self.avg_cpu_percent)?;
        writeln!(f, "Peak Process CPU Usage: {:.2}%", self.peak_cpu_percent)?;
        writeln!(
            f,
            "Average Process Memory Usage: {:.2} MB ({:.2}%)",
            self.avg_memory_mb, self.avg_memory_percent
        )?;
        write!(
            f,
            "Peak Process Memory Usage: {:.2} MB ({:.2}%)",
            self.peak_memory_mb, self.peak_memory_percent
        )?;
        if let (Some(avg), Some(peak)) = (self.avg_latency_ms, self.peak_latency_ms) {
            write!(f, "\nAverage Latency: {avg:.2} ms\nPeak Latency: {peak:.2} ms")?;
        }
        Ok(())
    }
}

pub struct Telemetry {
    config: TelemetryConfig,
    stats: Arc<FrameStats>,
    history: RwLock<VecDeque<ResourceSample>>,
    probe_factory: ProbeFactory,
}

impl Telemetry {
    pub fn new(config: TelemetryConfig, stats: Arc<FrameStats>) -> Self {
        let factory: ProbeFactory = Arc::new(|| {
            SysinfoProbe::current().map(|p| Box::new(p) as Box<dyn ProcessProbe>)
        });
        Self::with_probe_factory(config, stats, factory)
    }

    pub fn with_probe_factory(
        config: TelemetryConfig,
        stats: Arc<FrameStats>,
        probe_factory: ProbeFactory,
    ) -> Self {
        let capacity = config.history_capacity.max(1);
        Self {
            config,
            stats,
            history: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            probe_factory,
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Spawn the sampling loop; it runs until `stop_rx` turns true, the
    /// sender is dropped, or sampling fails.
    pub fn spawn(
        self: &Arc<Self>,
        stop_rx: watch::Receiver<bool>,
        tasks: Arc<TaskRegistry>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let _guard = tasks.register("telemetry");
            match this.run(stop_rx).await {
                Ok(()) => tracing::info!("Telemetry loop stopped"),
                Err(e) => tracing::warn!(error = %e, "Telemetry loop terminated"),
            }
        })
    }

    async fn run(&self, mut stop_rx: watch::Receiver<bool>) -> Result<(), TelemetryError> {
        let mut probe = (self.probe_factory)()?;
        self.reset_log().await?;
        self.history.write().await.clear();
        // 丢弃上一会话遗留的延迟累计
        let _ = self.stats.take_latency_window_ms();

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            if *stop_rx.borrow() {
                return Ok(());
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
            }

            let usage = probe.sample()?;
            let sample = ResourceSample {
                time: unix_now_secs(),
                cpu_percent: usage.cpu_percent,
                memory_mb: usage.memory_bytes as f64 / BYTES_PER_MB,
                memory_percent: usage.memory_percent,
                latency_ms: self.stats.take_latency_window_ms(),
            };
            self.push(sample).await;

            if let Err(e) = self.append_log(&sample).await {
                tracing::warn!(error = %e, path = %self.config.log_path, "Failed to append telemetry row");
            }
            tracing::info!(
                cpu_percent = sample.cpu_percent,
                memory_mb = sample.memory_mb,
                memory_percent = sample.memory_percent,
                latency_ms = sample.latency_ms,
                "Process usage"
            );
        }
    }

    async fn push(&self, sample: ResourceSample) {
        let capacity = self.config.history_capacity.max(1);
        let mut history = self.history.write().await;
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(sample);
    }

    async fn reset_log(&self) -> Result<(), TelemetryError> {
        if let Some(parent) = std::path::Path::new(&self.config.log_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.config.log_path, format!("{TELEMETRY_LOG_HEADER}\n")).await?;
        Ok(())
    }

    async fn append_log(&self, sample: &ResourceSample) -> Result<(), TelemetryError> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.config.log_path)
            .await?;
        file.write_all(format!("{}\n", sample.to_log_row()).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    /// Most recent samples, newest last.
    pub async fn recent(&self, limit: usize) -> Vec<ResourceSample> {
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).copied().collect()
    }

    pub async fn sample_count(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn summary(&self) -> Option<PerformanceSummary> {
        let history = self.history.read().await;
        PerformanceSummary::from_samples(history.iter())
    }
}

fn unix_now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ScriptedProbe {
        remaining: usize,
        calls: Arc<AtomicUsize>,
    }

    impl ProcessProbe for ScriptedProbe {
        fn sample(&mut self) -> Result<ProcessUsage, TelemetryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.remaining == 0 {
                return Err(TelemetryError::ProcessUnavailable("gone".into()));
            }
            self.remaining -= 1;
            Ok(ProcessUsage {
                cpu_percent: 10.0 * (n as f32 + 1.0),
                memory_bytes: 64 * 1024 * 1024,
                memory_percent: 1.5,
            })
        }
    }

    fn telemetry(dir: &tempfile::TempDir, samples: usize, capacity: usize) -> Arc<Telemetry> {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory: ProbeFactory = Arc::new(move || {
            Ok(Box::new(ScriptedProbe {
                remaining: samples,
                calls: calls.clone(),
            }) as Box<dyn ProcessProbe>)
        });
        let config = TelemetryConfig {
            log_path: dir.path().join("perf.csv").to_string_lossy().to_string(),
            interval_ms: 5,
            history_capacity: capacity,
        };
        Arc::new(Telemetry::with_probe_factory(
            config,
            Arc::new(FrameStats::new()),
            factory,
        ))
    }

    #[tokio::test]
    async fn failing_probe_ends_loop_and_keeps_bounded_history() {
        let dir = tempfile::tempdir().unwrap();
        let telemetry = telemetry(&dir, 5, 3);
        let tasks = TaskRegistry::new();
        let (_stop_tx, stop_rx) = watch::channel(false);

        let handle = telemetry.spawn(stop_rx, tasks.clone());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop ends after probe failure")
            .unwrap();

        assert_eq!(telemetry.sample_count().await, 3);
        let recent = telemetry.recent(10).await;
        assert_eq!(recent[0].cpu_percent, 30.0);
        assert_eq!(recent[2].cpu_percent, 50.0);
        assert_eq!(tasks.active_count(), 0);

        let log = std::fs::read_to_string(dir.path().join("perf.csv")).unwrap();
        let mut lines = log.lines();
        assert_eq!(lines.next(), Some(TELEMETRY_LOG_HEADER));
        let rows: Vec<&str> = lines.collect();
        assert_eq!(rows.len(), 5);
        for row in rows {
            assert_eq!(row.split(',').count(), 5, "row {row} must have 5 fields");
        }
    }

    #[tokio::test]
    async fn stop_signal_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let telemetry = telemetry(&dir, usize::MAX, 10);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = telemetry.spawn(stop_rx, TaskRegistry::new());
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("stopped in time")
            .unwrap();
        assert!(telemetry.summary().await.is_some());
    }

    #[test]
    fn log_row_includes_latency_field() {
        let with_latency = ResourceSample {
            time: 1.5,
            cpu_percent: 12.0,
            memory_mb: 100.0,
            memory_percent: 2.0,
            latency_ms: Some(4.25),
        };
        assert_eq!(with_latency.to_log_row(), "1.500,12.0,100.00,2.00,4.25");

        let idle = ResourceSample {
            latency_ms: None,
            ..with_latency
        };
        assert_eq!(idle.to_log_row(), "1.500,12.0,100.00,2.00,");
    }

    #[test]
    fn summary_averages_and_peaks() {
        let samples = [
            ResourceSample {
                time: 0.0,
                cpu_percent: 10.0,
                memory_mb: 100.0,
                memory_percent: 1.0,
                latency_ms: None,
            },
            ResourceSample {
                time: 1.0,
                cpu_percent: 30.0,
                memory_mb: 300.0,
                memory_percent: 3.0,
                latency_ms: Some(8.0),
            },
        ];
        let summary = PerformanceSummary::from_samples(samples.iter()).unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.avg_cpu_percent, 20.0);
        assert_eq!(summary.peak_cpu_percent, 30.0);
        assert_eq!(summary.avg_memory_mb, 200.0);
        assert_eq!(summary.peak_memory_percent, 3.0);
        assert_eq!(summary.avg_latency_ms, Some(8.0));

        let text = summary.to_string();
        assert!(text.contains("Average Process CPU Usage: 20.00%"));
        assert!(text.contains("Peak Latency: 8.00 ms"));

        assert!(PerformanceSummary::from_samples(std::iter::empty()).is_none());
    }
}
