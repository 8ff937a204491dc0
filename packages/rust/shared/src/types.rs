//! Core domain types for ReadingPal projects and their resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReadingPalError, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(
    /// Identifier of a project (UUID v7).
    ProjectId
);
define_id!(
    /// Identifier of an ingested resource (UUID v7).
    ResourceId
);
define_id!(
    /// Identifier of a chat attached to a project (UUID v7).
    ChatId
);
define_id!(
    /// Identifier of a submitted step chain (UUID v7).
    PipelineId
);

// ---------------------------------------------------------------------------
// ResourceStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a resource.
///
/// `New → Downloaded → Scraped → Processed`, with `Error` reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    New,
    Downloaded,
    Scraped,
    Error,
    Processed,
}

impl ResourceStatus {
    pub const ALL: [ResourceStatus; 5] = [
        Self::New,
        Self::Downloaded,
        Self::Scraped,
        Self::Error,
        Self::Processed,
    ];

    /// Storage/display label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Downloaded => "Downloaded",
            Self::Scraped => "Scraped",
            Self::Error => "Error",
            Self::Processed => "Processed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }

    /// Position along the pipeline; `None` for `Error`, which sits outside it.
    fn pipeline_rank(&self) -> Option<u8> {
        match self {
            Self::New => Some(0),
            Self::Downloaded => Some(1),
            Self::Scraped => Some(2),
            Self::Processed => Some(3),
            Self::Error => None,
        }
    }

    /// Whether `self → next` is allowed.
    ///
    /// Forward moves (including re-entry into the same state) are allowed from
    /// non-terminal states; `Error` is always reachable.
    pub fn can_transition_to(&self, next: ResourceStatus) -> bool {
        if next == Self::Error {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.pipeline_rank(), next.pipeline_rank()) {
            (Some(from), Some(to)) => to >= from,
            _ => false,
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = ReadingPalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ReadingPalError::validation(format!("unknown resource status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Kinds of lifecycle events recorded in the project event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProjectCreated,
    ResourceAdded,
    ProcessingStarted,
    DownloadedAndTextExtracted,
    ProcessingError,
    ResourceProcessed,
    ChatCreated,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        Self::ProjectCreated,
        Self::ResourceAdded,
        Self::ProcessingStarted,
        Self::DownloadedAndTextExtracted,
        Self::ProcessingError,
        Self::ResourceProcessed,
        Self::ChatCreated,
    ];

    /// Storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ResourceAdded => "resource_added",
            Self::ProcessingStarted => "processing_started",
            Self::DownloadedAndTextExtracted => "downloaded_and_text_extracted",
            Self::ProcessingError => "processing_error",
            Self::ResourceProcessed => "resource_processed",
            Self::ChatCreated => "chat_created",
        }
    }

    /// Human-readable label for event log views.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "Project created",
            Self::ResourceAdded => "Resource added",
            Self::ProcessingStarted => "Processing started",
            Self::DownloadedAndTextExtracted => "Downloaded and text extracted",
            Self::ProcessingError => "Processing error",
            Self::ResourceProcessed => "Resource processed",
            Self::ChatCreated => "Chat created",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for EventType {
    type Err = ReadingPalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ReadingPalError::validation(format!("unknown event type: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Root aggregate for a body of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Short label used by list views (`project-<id>`).
    pub fn display_id(&self) -> String {
        format!("project-{}", self.id)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

/// One user-submitted URL and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Owning project. Never changes after creation.
    pub project_id: ProjectId,
    pub url: String,
    pub status: ResourceStatus,
    /// Text returned by the extraction stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_content: Option<String>,
    /// Full failure detail; only set together with a move into `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Resource this one was derived from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ResourceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// A fresh `New` resource under `project_id`.
    pub fn new(id: ResourceId, project_id: ProjectId, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id,
            url: url.into(),
            status: ResourceStatus::New,
            scraped_content: None,
            error_msg: None,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only audit record of a lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Insertion sequence; breaks ties between equal timestamps.
    pub seq: i64,
    pub project_id: ProjectId,
    pub event_type: EventType,
    /// Identifier of the subject entity (project, resource or chat).
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn human_readable(&self) -> String {
        format!(
            "|{}| {}: {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.event_type,
            self.entity_id
        )
    }
}

/// A chat attached to a configured project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_roundtrip() {
        let id = ProjectId::new();
        let s = id.to_string();
        let parsed: ProjectId = s.parse().expect("parse ProjectId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_labels_roundtrip() {
        for status in ResourceStatus::ALL {
            let parsed: ResourceStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("Archived".parse::<ResourceStatus>().is_err());
    }

    #[test]
    fn forward_transitions_are_allowed() {
        use ResourceStatus::*;
        assert!(New.can_transition_to(Downloaded));
        assert!(Downloaded.can_transition_to(Downloaded));
        assert!(Downloaded.can_transition_to(Scraped));
        assert!(Scraped.can_transition_to(Processed));
        assert!(New.can_transition_to(Scraped));
    }

    #[test]
    fn backward_and_terminal_transitions_are_rejected() {
        use ResourceStatus::*;
        assert!(!Scraped.can_transition_to(Downloaded));
        assert!(!Processed.can_transition_to(Scraped));
        assert!(!Error.can_transition_to(Processed));
        assert!(!Error.can_transition_to(Downloaded));
    }

    #[test]
    fn error_is_reachable_from_every_state() {
        for status in ResourceStatus::ALL {
            assert!(status.can_transition_to(ResourceStatus::Error), "{status}");
        }
    }

    #[test]
    fn event_type_keys_roundtrip() {
        for kind in EventType::ALL {
            let parsed: EventType = kind.as_str().parse().expect("parse event type");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn resource_serialization_skips_empty_fields() {
        let resource = Resource::new(ResourceId::new(), ProjectId::new(), "https://example.com/a");
        let json = serde_json::to_string(&resource).expect("serialize");
        assert!(!json.contains("error_msg"));
        let parsed: Resource = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.status, ResourceStatus::New);
        assert_eq!(parsed.url, "https://example.com/a");
    }
}
