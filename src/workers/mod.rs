pub mod store_flush;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::store::Store;
use crate::tasks::TaskRegistry;

/// Timeout for individual worker invocations.
const WORKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    StoreFlush,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreFlush => "store_flush",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    tasks: Arc<TaskRegistry>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        tasks: Arc<TaskRegistry>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            tasks,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.enabled {
            return Vec::new();
        }

        vec![JobSpec {
            name: WorkerName::StoreFlush,
            // 每 10 秒落盘一次快照
            cron: "*/10 * * * * *",
            enabled: true,
        }]
    }

    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.enabled {
            tracing::info!("Workers disabled; skipping worker startup");
            return Ok(());
        }

        let _guard = self.tasks.register("worker_manager");
        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            drain_ms = DRAIN_TIMEOUT.as_millis() as u64,
            "Worker manager shutting down"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::StoreFlush => {
                    add_job(scheduler, self.tasks.clone(), spec.cron, spec.name, move || {
                        let store = store.clone();
                        async move {
                            store_flush::run(&store).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = spec.cron, "Registered worker");
        }
    }
}

/// Schedule `run` under `cron`. An invocation is skipped while the previous
/// one is still in flight, and each run is bounded by [`WORKER_TIMEOUT`].
/// Running invocations show up in the task registry under the worker name.
async fn add_job<Fut, F>(
    scheduler: &JobScheduler,
    tasks: Arc<TaskRegistry>,
    cron: &str,
    name: WorkerName,
    mut run: F,
) where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let in_flight = Arc::new(AtomicBool::new(false));
    let worker = name.as_str();

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let in_flight = in_flight.clone();
        if in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!(worker, "Previous run still in progress, skipping");
            return Box::pin(async {});
        }

        let fut = run();
        let tasks = tasks.clone();
        Box::pin(async move {
            let _task = tasks.register(worker);
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(worker, timeout_secs = WORKER_TIMEOUT.as_secs(), "Worker timed out");
            }
            in_flight.store(false, Ordering::Release);
        })
    });

    let added = match job {
        Ok(job) => scheduler.add(job).await.map(|_| ()),
        Err(err) => Err(err),
    };
    if let Err(err) = added {
        tracing::error!(error = %err, cron, worker, "Failed to schedule worker job");
    }
}
