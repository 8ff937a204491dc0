//! Event log reconciliation.
//!
//! State changes and their events are written separately, so a crash or a
//! failed event write can leave a resource whose status is ahead of its log.
//! [`reconcile_project`] appends the events each stored status implies but
//! the log lacks. Running it twice appends nothing the second time.

use std::collections::HashSet;

use readingpal_shared::{EventType, ProjectId, ReadingPalError, ResourceStatus, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::CoreContext;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub resources_scanned: usize,
    /// `(entity_id, event_type)` for each appended event, in append order.
    pub events_appended: Vec<(String, EventType)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.events_appended.is_empty()
    }
}

/// Events a resource in `status` must have in its history.
///
/// An `Error` resource may have failed at any point, so only the events that
/// bracket every failed run are required.
fn required_events(status: ResourceStatus) -> &'static [EventType] {
    use EventType::*;
    match status {
        ResourceStatus::New => &[ResourceAdded],
        ResourceStatus::Downloaded => &[ResourceAdded, ProcessingStarted],
        ResourceStatus::Scraped => &[
            ResourceAdded,
            ProcessingStarted,
            DownloadedAndTextExtracted,
        ],
        ResourceStatus::Processed => &[
            ResourceAdded,
            ProcessingStarted,
            DownloadedAndTextExtracted,
            ResourceProcessed,
        ],
        ResourceStatus::Error => &[ResourceAdded, ProcessingError],
    }
}

#[instrument(skip_all, fields(project_id = %project_id))]
pub async fn reconcile_project(ctx: &CoreContext, project_id: &ProjectId) -> Result<ReconcileReport> {
    if ctx.storage.get_project(project_id).await?.is_none() {
        return Err(ReadingPalError::ProjectNotFound(project_id.to_string()));
    }

    let mut report = ReconcileReport::default();

    ensure_events(ctx, project_id, &project_id.to_string(), &[EventType::ProjectCreated], &mut report)
        .await?;

    let resources = ctx.storage.list_resources_by_project(project_id).await?;
    report.resources_scanned = resources.len();
    for resource in &resources {
        ensure_events(
            ctx,
            project_id,
            &resource.id.to_string(),
            required_events(resource.status),
            &mut report,
        )
        .await?;
    }

    for chat in ctx.storage.list_chats(project_id).await? {
        ensure_events(ctx, project_id, &chat.id.to_string(), &[EventType::ChatCreated], &mut report)
            .await?;
    }

    if report.is_clean() {
        info!(resources = report.resources_scanned, "event log consistent");
    } else {
        warn!(
            resources = report.resources_scanned,
            appended = report.events_appended.len(),
            "event log repaired"
        );
    }
    Ok(report)
}

async fn ensure_events(
    ctx: &CoreContext,
    project_id: &ProjectId,
    entity_id: &str,
    required: &[EventType],
    report: &mut ReconcileReport,
) -> Result<()> {
    let present: HashSet<EventType> = ctx
        .events
        .for_entity(entity_id)
        .await?
        .into_iter()
        .map(|entry| entry.event_type)
        .collect();

    for &event_type in required {
        if present.contains(&event_type) {
            continue;
        }
        ctx.events.record(project_id, event_type, entity_id).await?;
        report.events_appended.push((entity_id.to_string(), event_type));
    }
    Ok(())
}
