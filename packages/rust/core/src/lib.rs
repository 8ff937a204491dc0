//! Pipeline planning and resource lifecycle for ReadingPal.
//!
//! This crate resolves a project's pipeline configuration, plans the step
//! chain for each new resource, and provides the job handlers that move a
//! resource through `New → Downloaded → Scraped → Processed` (or `Error`)
//! while recording every change in the project event log.

pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod planner;
pub mod project;
pub mod reconcile;
pub mod resolver;
pub mod state;

use std::sync::Arc;

use readingpal_storage::Storage;

pub use dispatch::WorkUnit;
pub use events::EventLog;
pub use handlers::{ExtractTextHandler, RagHandler, build_registry};
pub use planner::{PipelineEvent, Planner, build_chain};
pub use project::{AddResource, ChatManager, ProjectManager, ProjectOverview, ResourceProgress};
pub use reconcile::{ReconcileReport, reconcile_project};
pub use resolver::ConfigurationResolver;
pub use state::ResourceStateMachine;

/// The storage-backed components every operation works through.
#[derive(Clone)]
pub struct CoreContext {
    pub storage: Arc<Storage>,
    pub resolver: ConfigurationResolver,
    pub states: ResourceStateMachine,
    pub events: EventLog,
}

impl CoreContext {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            resolver: ConfigurationResolver::new(Arc::clone(&storage)),
            states: ResourceStateMachine::new(Arc::clone(&storage)),
            events: EventLog::new(Arc::clone(&storage)),
            storage,
        }
    }
}
