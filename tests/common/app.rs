use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use blink_monitor::capture::{CaptureController, FeedBackend, FrameStats};
use blink_monitor::config::{CaptureConfig, Config, TelemetryConfig, WorkerConfig};
use blink_monitor::detection::BlinkConfig;
use blink_monitor::routes::build_router;
use blink_monitor::state::AppState;
use blink_monitor::store::Store;
use blink_monitor::tasks::TaskRegistry;
use blink_monitor::telemetry::Telemetry;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub feed_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestApp {
    /// Poll status until the capture loop has ended on its own.
    pub async fn wait_for_capture_idle(&self) {
        for _ in 0..500 {
            if !self.state.capture().status().await.running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("capture did not finish in time");
    }
}

pub async fn spawn_test_server() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("blink-test.sled");
    let feed_path = temp_dir.path().join("feed.jsonl");

    // 直接构造 Config，避免 set_var 在并行测试中互相干扰
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 5000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "*".to_string(),
        capture: CaptureConfig {
            feed_path: feed_path.to_string_lossy().to_string(),
            target_fps: 1_000,
            snapshot_every_frames: 30,
            stop_timeout_secs: 2,
            event_buffer: 256,
        },
        blink: BlinkConfig::default(),
        telemetry: TelemetryConfig {
            log_path: temp_dir
                .path()
                .join("performance_log.txt")
                .to_string_lossy()
                .to_string(),
            interval_ms: 20,
            history_capacity: 50,
        },
        worker: WorkerConfig { enabled: false },
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let stats = Arc::new(FrameStats::new());
    let telemetry = Arc::new(Telemetry::new(config.telemetry.clone(), stats.clone()));
    let capture = Arc::new(CaptureController::new(
        config.capture.clone(),
        config.blink,
        store.clone(),
        Arc::new(FeedBackend::new(&feed_path)),
        telemetry,
        stats,
        TaskRegistry::new(),
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, capture, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        feed_path,
        _temp_dir: temp_dir,
    }
}
