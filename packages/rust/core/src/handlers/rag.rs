use async_trait::async_trait;
use readingpal_runtime::{JobHandler, JobOutcome, JobParams, JobSpec};
use readingpal_shared::EventType;
use tracing::{info, instrument, warn};

use crate::CoreContext;
use crate::dispatch::WorkUnit;

/// Placeholder processing step: marks the resource `Processed`.
///
/// Chunking, embedding and retrieval slot in here once they have work-units.
pub struct RagHandler {
    ctx: CoreContext,
}

impl RagHandler {
    pub fn new(ctx: CoreContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl JobHandler for RagHandler {
    fn spec(&self) -> JobSpec {
        WorkUnit::SimpleRag.spec()
    }

    #[instrument(skip_all, fields(project_id = %params.project_id, resource_id = %params.resource_id))]
    async fn run(&self, params: JobParams) -> JobOutcome {
        let entity_id = params.resource_id.to_string();
        let mut resource = match self.ctx.states.get(&params.resource_id).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(error = %e, "resource unavailable, skipping processing");
                self.ctx
                    .events
                    .record_or_log(&params.project_id, EventType::ProcessingError, &entity_id)
                    .await;
                return JobOutcome::Failed(e.to_string());
            }
        };

        if resource.status.is_terminal() {
            warn!(status = %resource.status, "resource already finished");
            return JobOutcome::Failed(format!("resource is already {}", resource.status));
        }

        if let Err(e) = self.ctx.states.mark_processed(&mut resource).await {
            let detail = e.to_string();
            warn!(error = %detail, "processing failed");
            if let Err(mark_err) = self.ctx.states.mark_error(&mut resource, detail.clone()).await {
                warn!(error = %mark_err, "failed to record resource error");
            }
            self.ctx
                .events
                .record_or_log(&resource.project_id, EventType::ProcessingError, &entity_id)
                .await;
            return JobOutcome::Failed(detail);
        }

        self.ctx
            .events
            .record_or_log(&resource.project_id, EventType::ResourceProcessed, &entity_id)
            .await;
        info!("resource processed");
        JobOutcome::Succeeded
    }
}
