//! Chain execution shared by the local and queued runtimes.

use readingpal_shared::PipelineId;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chain::{JobCall, StepChain};
use crate::registry::{JobOutcome, JobRegistry};

/// How one job call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    TimedOut,
    Panicked,
    Unregistered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: String,
    pub resource_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub jobs: Vec<JobReport>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.jobs.iter().all(|j| j.status == JobStatus::Succeeded)
    }
}

/// What happened to one submitted chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub pipeline_id: PipelineId,
    /// Executed steps only; steps after a halt are absent.
    pub steps: Vec<StepReport>,
    /// Index of the step whose failure stopped the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
}

impl ChainReport {
    pub fn is_complete(&self) -> bool {
        self.halted_at.is_none()
    }
}

/// Run `chain` step by step.
///
/// Jobs within a step are spawned together and each gets its own timeout.
/// The next step starts only once every job of the current one has finished
/// and succeeded.
#[instrument(skip_all, fields(pipeline_id = %pipeline_id, steps = chain.len()))]
pub async fn execute_chain(
    registry: &JobRegistry,
    pipeline_id: &PipelineId,
    chain: &StepChain,
) -> ChainReport {
    let mut report = ChainReport {
        pipeline_id: pipeline_id.clone(),
        steps: Vec::with_capacity(chain.len()),
        halted_at: None,
    };

    for (index, step) in chain.steps().iter().enumerate() {
        let mut pending = Vec::with_capacity(step.jobs().len());
        let mut jobs = Vec::with_capacity(step.jobs().len());

        for call in step.jobs() {
            match registry.get(&call.job) {
                Some(handler) => {
                    let params = call.params.clone();
                    let timeout = call.timeout();
                    let handle = tokio::spawn(async move {
                        tokio::time::timeout(timeout, handler.run(params)).await
                    });
                    pending.push((call, handle));
                }
                None => jobs.push(job_report(
                    call,
                    JobStatus::Unregistered,
                    Some(format!("no handler registered for job '{}'", call.job)),
                )),
            }
        }

        for (call, handle) in pending {
            let job = match handle.await {
                Ok(Ok(JobOutcome::Succeeded)) => job_report(call, JobStatus::Succeeded, None),
                Ok(Ok(JobOutcome::Failed(reason))) => {
                    job_report(call, JobStatus::Failed, Some(reason))
                }
                Ok(Err(_elapsed)) => job_report(
                    call,
                    JobStatus::TimedOut,
                    Some(format!("timed out after {}ms", call.timeout_ms)),
                ),
                Err(e) => job_report(call, JobStatus::Panicked, Some(e.to_string())),
            };
            if job.status != JobStatus::Succeeded {
                warn!(
                    job = %job.job,
                    resource_id = %job.resource_id,
                    status = ?job.status,
                    detail = job.detail.as_deref().unwrap_or(""),
                    "job did not succeed"
                );
            }
            jobs.push(job);
        }

        let step_report = StepReport { index, jobs };
        let succeeded = step_report.succeeded();
        report.steps.push(step_report);

        if !succeeded {
            report.halted_at = Some(index);
            info!(step = index, "chain halted");
            return report;
        }
    }

    info!("chain completed");
    report
}

fn job_report(call: &JobCall, status: JobStatus, detail: Option<String>) -> JobReport {
    JobReport {
        job: call.job.clone(),
        resource_id: call.params.resource_id.to_string(),
        status,
        detail,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use readingpal_shared::{ProjectId, ResourceId};

    use super::*;
    use crate::chain::{JobParams, JobSpec};
    use crate::registry::JobHandler;

    /// Records `"<name>:start"`/`"<name>:end"` around an optional delay.
    pub(crate) struct Recording {
        pub spec: JobSpec,
        pub delay: Duration,
        pub outcome: JobOutcome,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl JobHandler for Recording {
        fn spec(&self) -> JobSpec {
            self.spec
        }

        async fn run(&self, _params: JobParams) -> JobOutcome {
            self.log.lock().unwrap().push(format!("{}:start", self.spec.name));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("{}:end", self.spec.name));
            self.outcome.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl JobHandler for Panicking {
        fn spec(&self) -> JobSpec {
            JobSpec {
                name: "panics",
                timeout: Duration::from_secs(1),
            }
        }

        async fn run(&self, _params: JobParams) -> JobOutcome {
            panic!("handler bug");
        }
    }

    pub(crate) fn spec(name: &'static str, timeout_ms: u64) -> JobSpec {
        JobSpec {
            name,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub(crate) fn recording(
        name: &'static str,
        delay_ms: u64,
        outcome: JobOutcome,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<Recording> {
        Arc::new(Recording {
            spec: spec(name, 1_000),
            delay: Duration::from_millis(delay_ms),
            outcome,
            log: Arc::clone(log),
        })
    }

    pub(crate) fn params() -> JobParams {
        JobParams {
            project_id: ProjectId::new(),
            resource_id: ResourceId::new(),
        }
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        registry
            .register(recording("slow", 50, JobOutcome::Succeeded, &log))
            .register(recording("fast", 0, JobOutcome::Succeeded, &log));

        let mut chain = StepChain::new();
        chain.current_step().add_job(&spec("slow", 1_000), params());
        chain.create_next_step().add_job(&spec("fast", 1_000), params());

        let report = execute_chain(&registry, &PipelineId::new(), &chain).await;
        assert!(report.is_complete());
        assert_eq!(report.steps.len(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["slow:start", "slow:end", "fast:start", "fast:end"]
        );
    }

    #[tokio::test]
    async fn jobs_within_a_step_overlap() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        registry
            .register(recording("a", 50, JobOutcome::Succeeded, &log))
            .register(recording("b", 50, JobOutcome::Succeeded, &log));

        let mut chain = StepChain::new();
        chain
            .current_step()
            .add_job(&spec("a", 1_000), params())
            .add_job(&spec("b", 1_000), params());

        execute_chain(&registry, &PipelineId::new(), &chain).await;
        let log = log.lock().unwrap();
        // Both started before either finished.
        assert!(log[..2].iter().all(|entry| entry.ends_with(":start")));
    }

    #[tokio::test]
    async fn failed_step_halts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        registry
            .register(recording("extract", 0, JobOutcome::Failed("500".into()), &log))
            .register(recording("rag", 0, JobOutcome::Succeeded, &log));

        let mut chain = StepChain::new();
        chain.current_step().add_job(&spec("extract", 1_000), params());
        chain.create_next_step().add_job(&spec("rag", 1_000), params());

        let report = execute_chain(&registry, &PipelineId::new(), &chain).await;
        assert_eq!(report.halted_at, Some(0));
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].jobs[0].status, JobStatus::Failed);
        assert!(!log.lock().unwrap().iter().any(|e| e.starts_with("rag")));
    }

    #[tokio::test]
    async fn timeout_panic_and_unregistered_halt() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = JobRegistry::new();
        registry
            .register(recording("sleepy", 500, JobOutcome::Succeeded, &log))
            .register(Arc::new(Panicking));

        for (name, expected) in [
            ("sleepy", JobStatus::TimedOut),
            ("panics", JobStatus::Panicked),
            ("missing", JobStatus::Unregistered),
        ] {
            let mut chain = StepChain::new();
            chain.current_step().add_job(&spec(name, 20), params());
            let report = execute_chain(&registry, &PipelineId::new(), &chain).await;
            assert_eq!(report.halted_at, Some(0), "{name}");
            assert_eq!(report.steps[0].jobs[0].status, expected, "{name}");
        }
    }

    #[test]
    fn report_serializes_without_empty_fields() {
        let report = ChainReport {
            pipeline_id: PipelineId::new(),
            steps: vec![],
            halted_at: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("halted_at"));
    }
}
