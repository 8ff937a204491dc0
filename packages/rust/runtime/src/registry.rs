//! Job handler registration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::{JobParams, JobSpec};

/// Result of one job invocation, as seen by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    /// The job recorded its own failure; later steps must not run.
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Executable body of a named job.
///
/// Handlers absorb their own errors and report them through [`JobOutcome`].
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Name and timeout this handler is registered under.
    fn spec(&self) -> JobSpec;

    async fn run(&self, params: JobParams) -> JobOutcome;
}

/// Name → handler lookup used when executing chains.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its spec name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        let name = handler.spec().name;
        if self.handlers.insert(name, handler).is_some() {
            tracing::warn!(job = name, "job handler replaced");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
