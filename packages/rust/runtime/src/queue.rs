//! Storage-backed runtime: chains are queued in the `pipelines` table and
//! executed by a [`Worker`], possibly in another process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use readingpal_shared::{PipelineId, ReadingPalError, Result, WorkerConfig};
use readingpal_storage::{PipelineStatus, Storage};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

use crate::chain::StepChain;
use crate::execute::{ChainReport, execute_chain};
use crate::registry::JobRegistry;
use crate::{JobRuntime, check_submittable};

// ---------------------------------------------------------------------------
// QueuedRuntime
// ---------------------------------------------------------------------------

/// Submits chains by persisting them as `pending` pipeline rows.
pub struct QueuedRuntime {
    storage: Arc<Storage>,
}

impl QueuedRuntime {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl JobRuntime for QueuedRuntime {
    async fn submit(&self, chain: StepChain) -> Result<PipelineId> {
        // Handlers live in the worker process; only structure is checked here.
        check_submittable(&chain, None)?;

        let pipeline_id = PipelineId::new();
        self.storage
            .insert_pipeline(&pipeline_id, &chain.to_json()?)
            .await?;
        debug!(%pipeline_id, "pipeline queued");
        Ok(pipeline_id)
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Worker tuning, usually taken from the `[worker]` config section.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// How long to sleep when the queue is empty.
    pub poll_interval: Duration,
    /// Pipelines claimed and executed per iteration.
    pub max_concurrent: u32,
}

impl From<&WorkerConfig> for WorkerOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_concurrent: config.max_concurrent_pipelines.max(1),
        }
    }
}

/// Claims queued pipelines and executes them against a [`JobRegistry`].
pub struct Worker {
    storage: Arc<Storage>,
    registry: Arc<JobRegistry>,
    options: WorkerOptions,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(storage: Arc<Storage>, registry: Arc<JobRegistry>, options: WorkerOptions) -> Self {
        Self {
            storage,
            registry,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the returned flag to stop [`Worker::run`] after its current iteration.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Claim up to `max_concurrent` pending pipelines, run them concurrently
    /// and record their outcome. Returns how many pipelines finished.
    ///
    /// Storage errors on one pipeline never cut the others short: every
    /// spawned chain is drained before the first error is returned.
    #[instrument(skip_all, fields(max = self.options.max_concurrent))]
    pub async fn run_once(&self) -> Result<usize> {
        let pending = self
            .storage
            .list_pending_pipelines(self.options.max_concurrent)
            .await?;

        let mut first_error: Option<ReadingPalError> = None;
        let mut join_set = JoinSet::new();
        for record in pending {
            match self.storage.claim_pipeline(&record.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(pipeline_id = %record.id, "pipeline claimed by another worker");
                    continue;
                }
                Err(e) => {
                    error!(pipeline_id = %record.id, error = %e, "failed to claim pipeline");
                    first_error.get_or_insert(e);
                    continue;
                }
            }

            let chain = match StepChain::from_json(&record.chain_json) {
                Ok(chain) => chain,
                Err(e) => {
                    error!(pipeline_id = %record.id, error = %e, "unreadable pipeline");
                    let report = serde_json::json!({ "error": e.to_string() }).to_string();
                    if let Err(e) = self
                        .storage
                        .finish_pipeline(&record.id, PipelineStatus::Halted, Some(&report))
                        .await
                    {
                        error!(pipeline_id = %record.id, error = %e, "failed to record halted pipeline");
                        first_error.get_or_insert(e);
                    }
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            join_set.spawn(async move { execute_chain(&registry, &record.id, &chain).await });
        }

        let mut finished = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => {
                    finished += 1;
                    if let Err(e) = self.record(&report).await {
                        error!(pipeline_id = %report.pipeline_id, error = %e, "failed to record pipeline outcome");
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => error!(error = %e, "pipeline task aborted"),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(finished),
        }
    }

    async fn record(&self, report: &ChainReport) -> Result<()> {
        let status = if report.is_complete() {
            PipelineStatus::Completed
        } else {
            PipelineStatus::Halted
        };
        let json = serde_json::to_string(report)
            .map_err(|e| ReadingPalError::Runtime(format!("failed to serialize report: {e}")))?;
        self.storage
            .finish_pipeline(&report.pipeline_id, status, Some(&json))
            .await?;
        info!(pipeline_id = %report.pipeline_id, status = status.as_str(), "pipeline finished");
        Ok(())
    }

    /// Poll the queue until the shutdown flag is set.
    pub async fn run(&self) {
        info!(
            poll_ms = self.options.poll_interval.as_millis() as u64,
            max_concurrent = self.options.max_concurrent,
            "worker started"
        );

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.run_once().await {
                Ok(0) => sleep(self.options.poll_interval).await,
                Ok(n) => debug!(finished = n, "worker iteration"),
                Err(e) => {
                    error!(error = %e, "worker iteration failed");
                    sleep(self.options.poll_interval).await;
                }
            }
        }

        info!("worker stopped");
    }
}
