//! Event Log: append-only, project-scoped lifecycle records.

use std::sync::Arc;

use readingpal_shared::{EventLogEntry, EventType, ProjectId, Result};
use readingpal_storage::Storage;
use tracing::{debug, error};

#[derive(Clone)]
pub struct EventLog {
    storage: Arc<Storage>,
}

impl EventLog {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn record(
        &self,
        project_id: &ProjectId,
        event_type: EventType,
        entity_id: &str,
    ) -> Result<EventLogEntry> {
        let entry = self
            .storage
            .append_event(project_id, event_type, entity_id)
            .await?;
        debug!(
            %project_id,
            event = event_type.as_str(),
            entity_id,
            seq = entry.seq,
            "event recorded"
        );
        Ok(entry)
    }

    /// Record an event from a context that cannot surface the failure.
    ///
    /// A failed write is logged; the reconciliation pass restores it later.
    pub async fn record_or_log(&self, project_id: &ProjectId, event_type: EventType, entity_id: &str) {
        if let Err(e) = self.record(project_id, event_type, entity_id).await {
            error!(
                %project_id,
                event = event_type.as_str(),
                entity_id,
                error = %e,
                "failed to record event"
            );
        }
    }

    pub async fn for_project(&self, project_id: &ProjectId) -> Result<Vec<EventLogEntry>> {
        self.storage.list_events_for_project(project_id).await
    }

    pub async fn for_entity(&self, entity_id: &str) -> Result<Vec<EventLogEntry>> {
        self.storage.list_events_for_entity(entity_id).await
    }
}
