//! Resource State Machine.
//!
//! The only writer of resource status. Each transition checks the lifecycle
//! rules, then persists the resource in one update. Transitions emit no
//! events; callers record them in the [`EventLog`](crate::EventLog).

use std::sync::Arc;

use chrono::Utc;
use readingpal_shared::{ReadingPalError, Resource, ResourceId, ResourceStatus, Result};
use readingpal_storage::Storage;
use tracing::debug;

#[derive(Clone)]
pub struct ResourceStateMachine {
    storage: Arc<Storage>,
}

impl ResourceStateMachine {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Load a resource; a missing row is [`ReadingPalError::ResourceNotFound`].
    pub async fn get(&self, id: &ResourceId) -> Result<Resource> {
        self.storage
            .get_resource(id)
            .await?
            .ok_or_else(|| ReadingPalError::ResourceNotFound(id.to_string()))
    }

    /// `New | Downloaded → Downloaded`.
    pub async fn mark_downloaded(&self, resource: &mut Resource) -> Result<()> {
        self.transition(resource, ResourceStatus::Downloaded, |_| {})
            .await
    }

    /// Store the extracted text and move to `Scraped`.
    pub async fn mark_scraped(&self, resource: &mut Resource, content: String) -> Result<()> {
        self.transition(resource, ResourceStatus::Scraped, move |r| {
            r.scraped_content = Some(content);
        })
        .await
    }

    pub async fn mark_processed(&self, resource: &mut Resource) -> Result<()> {
        self.transition(resource, ResourceStatus::Processed, |_| {})
            .await
    }

    /// Move to `Error` from any state, keeping `message` verbatim.
    ///
    /// Previously extracted content is left in place.
    pub async fn mark_error(&self, resource: &mut Resource, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.transition(resource, ResourceStatus::Error, move |r| {
            r.error_msg = Some(message);
        })
        .await
    }

    async fn transition(
        &self,
        resource: &mut Resource,
        next: ResourceStatus,
        apply: impl FnOnce(&mut Resource),
    ) -> Result<()> {
        if !resource.status.can_transition_to(next) {
            return Err(ReadingPalError::InvalidTransition {
                from: resource.status.to_string(),
                to: next.to_string(),
            });
        }

        let mut updated = resource.clone();
        updated.status = next;
        apply(&mut updated);
        updated.updated_at = Utc::now();

        self.storage.save_resource(&updated).await?;
        debug!(resource_id = %updated.id, from = %resource.status, to = %next, "resource transition");
        *resource = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configured_project, test_context};

    async fn stored_resource(ctx: &crate::CoreContext) -> Resource {
        let project = configured_project(ctx).await;
        let resource = Resource::new(ResourceId::new(), project.id, "https://example.com/a");
        ctx.storage.insert_resource(&resource).await.unwrap();
        resource
    }

    #[tokio::test]
    async fn happy_path_is_persisted() {
        let ctx = test_context().await;
        let mut resource = stored_resource(&ctx).await;

        ctx.states.mark_downloaded(&mut resource).await.unwrap();
        ctx.states.mark_downloaded(&mut resource).await.expect("re-entry allowed");
        ctx.states
            .mark_scraped(&mut resource, "hello world".into())
            .await
            .unwrap();
        ctx.states.mark_processed(&mut resource).await.unwrap();

        let stored = ctx.states.get(&resource.id).await.unwrap();
        assert_eq!(stored.status, ResourceStatus::Processed);
        assert_eq!(stored.scraped_content.as_deref(), Some("hello world"));
        assert!(stored.error_msg.is_none());
    }

    #[tokio::test]
    async fn error_keeps_prior_content() {
        let ctx = test_context().await;
        let mut resource = stored_resource(&ctx).await;
        ctx.states
            .mark_scraped(&mut resource, "partial".into())
            .await
            .unwrap();
        ctx.states
            .mark_error(&mut resource, "embedding failed\nbacktrace...")
            .await
            .unwrap();

        let stored = ctx.states.get(&resource.id).await.unwrap();
        assert_eq!(stored.status, ResourceStatus::Error);
        assert_eq!(stored.scraped_content.as_deref(), Some("partial"));
        assert_eq!(stored.error_msg.as_deref(), Some("embedding failed\nbacktrace..."));
    }

    #[tokio::test]
    async fn terminal_states_reject_forward_moves() {
        let ctx = test_context().await;
        let mut resource = stored_resource(&ctx).await;
        ctx.states.mark_error(&mut resource, "boom").await.unwrap();

        let err = ctx.states.mark_processed(&mut resource).await.unwrap_err();
        assert!(matches!(err, ReadingPalError::InvalidTransition { .. }));
        // The in-memory copy is untouched by a rejected move.
        assert_eq!(resource.status, ResourceStatus::Error);
    }

    #[tokio::test]
    async fn missing_resource_is_not_found() {
        let ctx = test_context().await;
        let err = ctx.states.get(&ResourceId::new()).await.unwrap_err();
        assert!(matches!(err, ReadingPalError::ResourceNotFound(_)));
    }
}
