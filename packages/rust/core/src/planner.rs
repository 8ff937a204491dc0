//! Pipeline Planner: turns a resolved configuration into a step chain and
//! hands it to the job runtime.

use std::sync::Arc;

use readingpal_runtime::{JobParams, JobRuntime, StepChain};
use readingpal_shared::{Configuration, PipelineId, ProjectId, ReadingPalError, ResourceId, Result};
use tracing::{info, instrument};

use crate::dispatch;

/// Events the planner may be asked to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    ResourceCreated,
    ProjectCreated,
    ChatCreated,
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ResourceCreated => "ResourceCreated",
            Self::ProjectCreated => "ProjectCreated",
            Self::ChatCreated => "ChatCreated",
        };
        f.write_str(name)
    }
}

/// Build the step chain for `event`.
///
/// Pure: reads only `configuration` and never touches storage. Every
/// planning-time error surfaces here, before anything is submitted.
pub fn build_chain(
    event: PipelineEvent,
    configuration: &Configuration,
    project_id: &ProjectId,
    resource_id: &ResourceId,
) -> Result<StepChain> {
    if event != PipelineEvent::ResourceCreated {
        return Err(ReadingPalError::UnknownEvent(event.to_string()));
    }

    if let Some(unit) = dispatch::download_stage(&configuration.downloader)? {
        return Err(ReadingPalError::PlanInvariant(format!(
            "download stage must be folded into text extraction, got work-unit {unit:?}"
        )));
    }

    let params = JobParams {
        project_id: project_id.clone(),
        resource_id: resource_id.clone(),
    };

    let mut chain = StepChain::new();
    let extract = dispatch::text_extraction_stage(&configuration.text_extractor)?;
    chain.current_step().add_job(&extract.spec(), params.clone());

    for group in dispatch::processing_stage(configuration)? {
        let step = chain.create_next_step();
        for unit in group {
            step.add_job(&unit.spec(), params.clone());
        }
    }

    Ok(chain)
}

#[derive(Clone)]
pub struct Planner {
    runtime: Arc<dyn JobRuntime>,
}

impl Planner {
    pub fn new(runtime: Arc<dyn JobRuntime>) -> Self {
        Self { runtime }
    }

    /// Build and submit the chain for `event`. Returns once the runtime has
    /// accepted it; no stage has necessarily run yet.
    #[instrument(skip_all, fields(event = %event, project_id = %project_id, resource_id = %resource_id))]
    pub async fn plan(
        &self,
        event: PipelineEvent,
        configuration: &Configuration,
        project_id: &ProjectId,
        resource_id: &ResourceId,
    ) -> Result<PipelineId> {
        let chain = build_chain(event, configuration, project_id, resource_id)?;
        self.submit(chain).await
    }

    /// Submit a chain produced by [`build_chain`].
    pub async fn submit(&self, chain: StepChain) -> Result<PipelineId> {
        let steps = chain.len();
        let pipeline_id = self.runtime.submit(chain).await?;
        info!(%pipeline_id, steps, "pipeline submitted");
        Ok(pipeline_id)
    }
}
