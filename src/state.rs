use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::capture::CaptureController;
use crate::config::Config;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    capture: Arc<CaptureController>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        capture: Arc<CaptureController>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            capture,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::capture::{CaptureController, FeedBackend, FrameStats};
    use crate::config::Config;
    use crate::store::Store;
    use crate::tasks::TaskRegistry;
    use crate::telemetry::Telemetry;

    use super::*;

    fn build_state(dir: &tempfile::TempDir, tx: broadcast::Sender<()>) -> AppState {
        let cfg = Config::from_env();
        let store = Arc::new(Store::open(dir.path().join("state.sled").to_str().unwrap()).unwrap());
        let stats = Arc::new(FrameStats::new());
        let telemetry = Arc::new(Telemetry::new(cfg.telemetry.clone(), stats.clone()));
        let capture = Arc::new(CaptureController::new(
            cfg.capture.clone(),
            cfg.blink,
            store.clone(),
            Arc::new(FeedBackend::new(dir.path().join("missing.jsonl"))),
            telemetry,
            stats,
            TaskRegistry::new(),
        ));
        AppState::new(store, capture, &cfg, tx)
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = build_state(&tmp, tx.clone());

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn state_clones_share_the_capture_counter() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = build_state(&tmp, tx);
        let cloned = state.clone();

        assert_eq!(cloned.capture().counter().get(), 0);
        assert!(!state.capture().status().await.running);
        assert_eq!(state.uptime_secs(), 0);
    }
}
