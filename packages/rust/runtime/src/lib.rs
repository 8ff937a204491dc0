//! Job runtime for ReadingPal pipelines.
//!
//! A pipeline is a [`StepChain`] of named job calls. Handlers are registered
//! in a [`JobRegistry`] under a name and timeout; a [`JobRuntime`] accepts
//! chains and executes them asynchronously with strict step ordering.
//!
//! Two runtimes are provided:
//! - [`LocalRuntime`]: runs chains as tasks in the current process
//! - [`QueuedRuntime`] + [`Worker`]: queues chains in storage for a worker loop

mod chain;
mod execute;
mod local;
mod queue;
mod registry;

use async_trait::async_trait;
use readingpal_shared::{PipelineId, ReadingPalError, Result};

pub use chain::{JobCall, JobParams, JobSpec, Step, StepChain};
pub use execute::{ChainReport, JobReport, JobStatus, StepReport, execute_chain};
pub use local::LocalRuntime;
pub use queue::{QueuedRuntime, Worker, WorkerOptions};
pub use registry::{JobHandler, JobOutcome, JobRegistry};

/// Accepts step chains for asynchronous execution.
#[async_trait]
pub trait JobRuntime: Send + Sync {
    /// Returns once the chain is accepted; does not wait for any job to run.
    async fn submit(&self, chain: StepChain) -> Result<PipelineId>;
}

/// Reject chains that could never run: empty ones, and ones naming jobs
/// missing from `registry` when the executing registry is known.
pub(crate) fn check_submittable(chain: &StepChain, registry: Option<&JobRegistry>) -> Result<()> {
    if chain.is_empty() {
        return Err(ReadingPalError::Runtime(
            "cannot submit an empty step chain".into(),
        ));
    }
    if let Some(registry) = registry {
        if let Some(call) = chain.job_calls().find(|c| !registry.contains(&c.job)) {
            return Err(ReadingPalError::Runtime(format!(
                "no handler registered for job '{}' (registered: {})",
                call.job,
                registry.names().join(", ")
            )));
        }
    }
    Ok(())
}
