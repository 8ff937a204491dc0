//! Project, resource and chat operations used by the CLI.

use chrono::Utc;
use readingpal_shared::{
    Chat, ChatId, Configuration, EventLogEntry, EventType, PipelineId, Project, ProjectId,
    ReadingPalError, Resource, ResourceId, Result,
};
use readingpal_storage::{ConfigSelection, PipelineOptions, PipelineStatus};
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::CoreContext;
use crate::planner::{PipelineEvent, Planner, build_chain};

/// Outcome of [`ProjectManager::add_resource`].
#[derive(Debug, Clone)]
pub enum AddResource {
    /// The resource was stored and its pipeline accepted by the runtime.
    Planned {
        resource: Resource,
        pipeline_id: PipelineId,
    },
    /// The project has no configuration; nothing was stored.
    NotConfigured,
}

/// Where a planned resource stands, for callers waiting on its pipeline.
#[derive(Debug, Clone)]
pub enum ResourceProgress {
    /// The pipeline may still move the resource.
    InFlight(Resource),
    /// The resource is terminal, or its pipeline has stopped. A halted
    /// pipeline can leave the resource non-terminal.
    Settled(Resource),
}

/// Everything a project view displays.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectOverview {
    pub project: Project,
    /// Most recently updated first.
    pub resources: Vec<Resource>,
    pub chats: Vec<Chat>,
    pub configuration: Option<Configuration>,
}

// ---------------------------------------------------------------------------
// ProjectManager
// ---------------------------------------------------------------------------

pub struct ProjectManager {
    ctx: CoreContext,
    planner: Planner,
}

impl ProjectManager {
    pub fn new(ctx: CoreContext, planner: Planner) -> Self {
        Self { ctx, planner }
    }

    pub async fn create_project(&self) -> Result<Project> {
        let project = Project::new();
        self.ctx.storage.insert_project(&project).await?;
        self.ctx
            .events
            .record(&project.id, EventType::ProjectCreated, &project.id.to_string())
            .await?;
        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    pub async fn get_project(&self, project_id: &ProjectId) -> Result<Project> {
        self.ctx
            .storage
            .get_project(project_id)
            .await?
            .ok_or_else(|| ReadingPalError::ProjectNotFound(project_id.to_string()))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.ctx.storage.list_projects().await
    }

    pub async fn options(&self) -> Result<PipelineOptions> {
        self.ctx.storage.list_options().await
    }

    pub async fn default_selection(&self) -> Result<ConfigSelection> {
        self.ctx.storage.default_selection().await
    }

    /// Validate `selection` and make it the project's configuration.
    ///
    /// An invalid selection leaves the previous configuration row in place.
    #[instrument(skip_all, fields(project_id = %project_id))]
    pub async fn configure_project(
        &self,
        project_id: &ProjectId,
        selection: &ConfigSelection,
    ) -> Result<Configuration> {
        self.get_project(project_id).await?;
        let configuration = self
            .ctx
            .resolver
            .resolve_selection(project_id, selection)
            .await?;
        self.ctx
            .storage
            .set_project_config(project_id, selection)
            .await?;
        info!("project configured");
        Ok(configuration)
    }

    /// Add a resource and submit its pipeline.
    ///
    /// Planning errors are raised before any row is written. If the runtime
    /// rejects the chain, the stored resource is moved to `Error` and the
    /// rejection is returned.
    #[instrument(skip_all, fields(project_id = %project_id, url = %url))]
    pub async fn add_resource(&self, project_id: &ProjectId, url: &str) -> Result<AddResource> {
        let url = validate_url(url)?;
        self.get_project(project_id).await?;

        let Some(configuration) = self.ctx.resolver.resolve(project_id).await? else {
            info!("project not configured, resource not added");
            return Ok(AddResource::NotConfigured);
        };

        let resource_id = ResourceId::new();
        let chain = build_chain(
            PipelineEvent::ResourceCreated,
            &configuration,
            project_id,
            &resource_id,
        )?;

        let mut resource = Resource::new(resource_id, project_id.clone(), url);
        self.ctx.storage.insert_resource(&resource).await?;
        self.ctx
            .events
            .record(project_id, EventType::ResourceAdded, &resource.id.to_string())
            .await?;

        match self.planner.submit(chain).await {
            Ok(pipeline_id) => Ok(AddResource::Planned {
                resource,
                pipeline_id,
            }),
            Err(e) => {
                warn!(error = %e, "pipeline submission rejected");
                if let Err(mark_err) = self.ctx.states.mark_error(&mut resource, e.to_string()).await {
                    warn!(error = %mark_err, "failed to record resource error");
                }
                self.ctx
                    .events
                    .record_or_log(project_id, EventType::ProcessingError, &resource.id.to_string())
                    .await;
                Err(e)
            }
        }
    }

    pub async fn get_resource(&self, resource_id: &ResourceId) -> Result<Resource> {
        self.ctx.states.get(resource_id).await
    }

    /// Check a resource together with the queued pipeline that processes it.
    pub async fn progress(
        &self,
        resource_id: &ResourceId,
        pipeline_id: &PipelineId,
    ) -> Result<ResourceProgress> {
        let resource = self.ctx.states.get(resource_id).await?;
        if resource.status.is_terminal() {
            return Ok(ResourceProgress::Settled(resource));
        }

        let stopped = match self.ctx.storage.get_pipeline(pipeline_id).await? {
            Some(record) => matches!(
                record.status,
                PipelineStatus::Completed | PipelineStatus::Halted
            ),
            None => {
                warn!(%pipeline_id, "pipeline record missing");
                true
            }
        };
        if stopped {
            Ok(ResourceProgress::Settled(resource))
        } else {
            Ok(ResourceProgress::InFlight(resource))
        }
    }

    pub async fn list_resources(&self, project_id: &ProjectId) -> Result<Vec<Resource>> {
        self.ctx.storage.list_resources_by_project(project_id).await
    }

    pub async fn events(&self, project_id: &ProjectId) -> Result<Vec<EventLogEntry>> {
        self.ctx.events.for_project(project_id).await
    }

    pub async fn overview(&self, project_id: &ProjectId) -> Result<ProjectOverview> {
        let project = self.get_project(project_id).await?;
        Ok(ProjectOverview {
            resources: self.ctx.storage.list_resources_by_project(project_id).await?,
            chats: self.ctx.storage.list_chats(project_id).await?,
            configuration: self.ctx.resolver.resolve(project_id).await?,
            project,
        })
    }
}

/// Accept only absolute http(s) URLs with a host. Returns the trimmed input.
fn validate_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ReadingPalError::validation(format!("invalid URL '{trimmed}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ReadingPalError::validation(format!(
            "unsupported URL scheme '{}': only http and https are allowed",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ReadingPalError::validation(format!("URL has no host: {trimmed}")));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// ChatManager
// ---------------------------------------------------------------------------

pub struct ChatManager {
    ctx: CoreContext,
}

impl ChatManager {
    pub fn new(ctx: CoreContext) -> Self {
        Self { ctx }
    }

    /// Create a chat. Returns `None` when the project has no configuration.
    #[instrument(skip_all, fields(project_id = %project_id))]
    pub async fn add_chat(&self, project_id: &ProjectId, name: &str) -> Result<Option<Chat>> {
        if self.ctx.storage.get_project(project_id).await?.is_none() {
            return Err(ReadingPalError::ProjectNotFound(project_id.to_string()));
        }
        if self.ctx.resolver.resolve(project_id).await?.is_none() {
            info!("project not configured, chat not created");
            return Ok(None);
        }

        let chat = Chat {
            id: ChatId::new(),
            project_id: project_id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.ctx.storage.insert_chat(&chat).await?;
        self.ctx
            .events
            .record(project_id, EventType::ChatCreated, &chat.id.to_string())
            .await?;
        Ok(Some(chat))
    }

    pub async fn list_chats(&self, project_id: &ProjectId) -> Result<Vec<Chat>> {
        self.ctx.storage.list_chats(project_id).await
    }
}
