//! In-process runtime: chains run as tasks on the current tokio runtime.

use std::sync::Arc;

use async_trait::async_trait;
use readingpal_shared::{PipelineId, Result};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chain::StepChain;
use crate::execute::{ChainReport, execute_chain};
use crate::registry::JobRegistry;
use crate::{JobRuntime, check_submittable};

pub struct LocalRuntime {
    registry: Arc<JobRegistry>,
    running: Mutex<Vec<JoinHandle<ChainReport>>>,
}

impl LocalRuntime {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            running: Mutex::new(Vec::new()),
        }
    }

    /// Wait until every submitted chain has finished, including chains
    /// submitted while waiting. Returns their reports in submission order.
    pub async fn wait_idle(&self) -> Vec<ChainReport> {
        let mut reports = Vec::new();
        loop {
            let handles = std::mem::take(&mut *self.running.lock().await);
            if handles.is_empty() {
                return reports;
            }
            for handle in handles {
                match handle.await {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!(error = %e, "pipeline task aborted"),
                }
            }
        }
    }
}

#[async_trait]
impl JobRuntime for LocalRuntime {
    async fn submit(&self, chain: StepChain) -> Result<PipelineId> {
        check_submittable(&chain, Some(&self.registry))?;

        let pipeline_id = PipelineId::new();
        let registry = Arc::clone(&self.registry);
        let id = pipeline_id.clone();
        let handle = tokio::spawn(async move { execute_chain(&registry, &id, &chain).await });

        self.running.lock().await.push(handle);
        debug!(%pipeline_id, "pipeline submitted to local runtime");
        Ok(pipeline_id)
    }
}
