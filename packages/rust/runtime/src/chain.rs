//! Step chains: the unit of submission to a [`JobRuntime`](crate::JobRuntime).
//!
//! A chain is an ordered list of steps; each step holds one or more job calls.
//! Chains are plain data so they can be queued and executed in another process.

use std::time::Duration;

use readingpal_shared::{ProjectId, ReadingPalError, ResourceId, Result};
use serde::{Deserialize, Serialize};

/// Registration metadata of a job: its invocation name and per-call timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSpec {
    pub name: &'static str,
    pub timeout: Duration,
}

/// Parameters every pipeline job is invoked with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobParams {
    pub project_id: ProjectId,
    pub resource_id: ResourceId,
}

/// One scheduled invocation of a named job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCall {
    pub job: String,
    pub timeout_ms: u64,
    pub params: JobParams,
}

impl JobCall {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Jobs that may run concurrently with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    jobs: Vec<JobCall>,
}

impl Step {
    /// Schedule `spec` with `params` in this step.
    pub fn add_job(&mut self, spec: &JobSpec, params: JobParams) -> &mut Self {
        self.jobs.push(JobCall {
            job: spec.name.to_string(),
            timeout_ms: u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX),
            params,
        });
        self
    }

    pub fn jobs(&self) -> &[JobCall] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Steps executed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepChain {
    steps: Vec<Step>,
}

impl Default for StepChain {
    fn default() -> Self {
        Self::new()
    }
}

impl StepChain {
    /// A chain with one empty first step.
    pub fn new() -> Self {
        Self {
            steps: vec![Step::default()],
        }
    }

    /// The step jobs are currently being added to.
    pub fn current_step(&mut self) -> &mut Step {
        if self.steps.is_empty() {
            self.steps.push(Step::default());
        }
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    /// Append a step that runs after every job of the current one.
    pub fn create_next_step(&mut self) -> &mut Step {
        self.steps.push(Step::default());
        self.current_step()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(Step::is_empty)
    }

    /// Every job call across all steps, in chain order.
    pub fn job_calls(&self) -> impl Iterator<Item = &JobCall> {
        self.steps.iter().flat_map(|step| step.jobs.iter())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ReadingPalError::Runtime(format!("failed to serialize step chain: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReadingPalError::Runtime(format!("failed to parse step chain: {e}")))
    }
}
