//! Work-unit handlers invoked by the job runtime.
//!
//! Handlers never return errors to the runtime. Every failure is absorbed
//! into the resource's `Error` state plus a `ProcessingError` event, and
//! reported as [`JobOutcome::Failed`](readingpal_runtime::JobOutcome) so the
//! runtime stops the chain.

mod extract_text;
mod rag;

use std::sync::Arc;

use readingpal_reader::ReaderClient;
use readingpal_runtime::JobRegistry;

pub use extract_text::ExtractTextHandler;
pub use rag::RagHandler;

use crate::CoreContext;

/// Registry with every pipeline handler, for a runtime or worker.
pub fn build_registry(ctx: &CoreContext, reader: Arc<ReaderClient>) -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry
        .register(Arc::new(ExtractTextHandler::new(ctx.clone(), reader)))
        .register(Arc::new(RagHandler::new(ctx.clone())));
    registry
}
