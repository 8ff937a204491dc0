use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use readingpal_reader::ReaderClient;
use readingpal_runtime::{JobHandler, JobOutcome, JobParams, JobSpec};
use readingpal_shared::{EventType, ReadingPalError, Resource, Result};
use tracing::{info, instrument, warn};

use crate::CoreContext;
use crate::dispatch::{STAGE_TIMEOUT, WorkUnit};

/// Time the handler gives itself before recording a timeout. It stays under
/// the runtime's job timeout so the failure is written before cancellation.
pub const EXTRACT_BUDGET: Duration = STAGE_TIMEOUT.saturating_sub(Duration::from_secs(1));

/// Downloads a resource through the reader API and stores its text.
pub struct ExtractTextHandler {
    ctx: CoreContext,
    reader: Arc<ReaderClient>,
    budget: Duration,
}

impl ExtractTextHandler {
    pub fn new(ctx: CoreContext, reader: Arc<ReaderClient>) -> Self {
        Self::with_budget(ctx, reader, EXTRACT_BUDGET)
    }

    pub fn with_budget(ctx: CoreContext, reader: Arc<ReaderClient>, budget: Duration) -> Self {
        Self { ctx, reader, budget }
    }

    async fn extract(&self, resource: &mut Resource) -> Result<()> {
        let entity_id = resource.id.to_string();
        let project_id = resource.project_id.clone();

        self.ctx
            .events
            .record_or_log(&project_id, EventType::ProcessingStarted, &entity_id)
            .await;
        self.ctx.states.mark_downloaded(resource).await?;

        // Planning only happens for configured projects.
        let configuration = self
            .ctx
            .resolver
            .resolve(&project_id)
            .await?
            .ok_or_else(|| ReadingPalError::ConfigurationMissing {
                project_id: project_id.to_string(),
            })?;

        let content = self
            .reader
            .fetch(&resource.url, &configuration.text_extractor.model_name)
            .await?;

        self.ctx.states.mark_scraped(resource, content).await?;
        self.ctx
            .events
            .record_or_log(&project_id, EventType::DownloadedAndTextExtracted, &entity_id)
            .await;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ExtractTextHandler {
    fn spec(&self) -> JobSpec {
        WorkUnit::JinaReader.spec()
    }

    #[instrument(skip_all, fields(project_id = %params.project_id, resource_id = %params.resource_id))]
    async fn run(&self, params: JobParams) -> JobOutcome {
        let mut resource = match self.ctx.states.get(&params.resource_id).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!(error = %e, "resource unavailable, skipping extraction");
                self.ctx
                    .events
                    .record_or_log(
                        &params.project_id,
                        EventType::ProcessingError,
                        &params.resource_id.to_string(),
                    )
                    .await;
                return JobOutcome::Failed(e.to_string());
            }
        };

        let result = match tokio::time::timeout(self.budget, self.extract(&mut resource)).await {
            Ok(result) => result,
            Err(_) => Err(ReadingPalError::Runtime(format!(
                "text extraction timed out after {}ms",
                self.budget.as_millis()
            ))),
        };

        match result {
            Ok(()) => {
                info!("text extracted");
                JobOutcome::Succeeded
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(error = %detail, "text extraction failed");
                if let Err(mark_err) = self.ctx.states.mark_error(&mut resource, detail.clone()).await {
                    warn!(error = %mark_err, "failed to record resource error");
                }
                self.ctx
                    .events
                    .record_or_log(
                        &resource.project_id,
                        EventType::ProcessingError,
                        &resource.id.to_string(),
                    )
                    .await;
                JobOutcome::Failed(detail)
            }
        }
    }
}
