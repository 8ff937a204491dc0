//! Configuration Resolver: project configuration rows → validated [`Configuration`].

use std::sync::Arc;

use readingpal_shared::{
    Chunker, Configuration, Downloader, Embedder, LlmModel, Processor, ProjectId,
    ReadingPalError, Result, TextExtractor,
};
use readingpal_storage::{ConfigSelection, ConfigurationRows, Storage};
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct ConfigurationResolver {
    storage: Arc<Storage>,
}

impl ConfigurationResolver {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Resolve the project's current configuration.
    ///
    /// `Ok(None)` means the project has no configuration row and is not ready
    /// for pipeline work. A present configuration is validated on every call,
    /// since its rows may change between two resources of the same project.
    #[instrument(skip_all, fields(project_id = %project_id))]
    pub async fn resolve(&self, project_id: &ProjectId) -> Result<Option<Configuration>> {
        let Some(rows) = self.storage.load_configuration_rows(project_id).await? else {
            debug!("project has no configuration");
            return Ok(None);
        };

        let configuration = materialize(project_id, &rows)?;
        configuration.validate()?;
        Ok(Some(configuration))
    }

    /// Resolve a candidate selection without persisting it.
    pub async fn resolve_selection(
        &self,
        project_id: &ProjectId,
        selection: &ConfigSelection,
    ) -> Result<Configuration> {
        let rows = self
            .storage
            .load_selection_rows(selection)
            .await?
            .ok_or_else(|| {
                ReadingPalError::configuration_invalid(format!(
                    "selection references unknown option rows: {selection:?}"
                ))
            })?;

        let configuration = materialize(project_id, &rows)?;
        configuration.validate()?;
        Ok(configuration)
    }
}

/// Parse joined option rows into typed stage choices.
pub fn materialize(project_id: &ProjectId, rows: &ConfigurationRows) -> Result<Configuration> {
    let size = rows
        .chunk_size
        .map(|size| {
            u32::try_from(size).map_err(|_| {
                ReadingPalError::configuration_invalid(format!("invalid chunk size {size}"))
            })
        })
        .transpose()?;

    let chunker = Chunker {
        kind: rows.chunker_type.parse()?,
        size,
    };

    Ok(Configuration {
        project_id: project_id.clone(),
        downloader: Downloader {
            kind: rows.downloader_type.parse()?,
        },
        text_extractor: TextExtractor {
            provider: rows.text_extractor_provider.parse()?,
            model_name: rows.text_extractor_model.clone(),
        },
        embedder: Embedder {
            provider: rows.embedder_provider.parse()?,
            model_name: rows.embedder_model.clone(),
        },
        processor: Processor {
            kind: rows.processor_type.parse()?,
            chunker,
        },
        llm_model: LlmModel {
            model_name: rows.llm_model.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use readingpal_shared::{ChunkerKind, DownloaderKind, Project, Provider};

    use super::*;
    use crate::test_support::{configured_project, test_context};

    fn rows() -> ConfigurationRows {
        ConfigurationRows {
            downloader_type: "Jina AI reader using Jina API".into(),
            text_extractor_provider: "Jina AI".into(),
            text_extractor_model: "ReaderLM-v2".into(),
            embedder_provider: "Jina AI".into(),
            embedder_model: "jina-embeddings-v4".into(),
            chunker_type: "Fixed size".into(),
            chunk_size: Some(1024),
            processor_type: "Simple RAG".into(),
            llm_model: "ollama_chat/qwen3:4b".into(),
        }
    }

    #[test]
    fn materialize_parses_every_choice() {
        let config = materialize(&ProjectId::new(), &rows()).unwrap();
        assert_eq!(config.downloader.kind, DownloaderKind::JinaReaderApi);
        assert_eq!(config.text_extractor.provider, Provider::Jina);
        assert_eq!(config.processor.chunker.kind, ChunkerKind::Fixed);
        assert_eq!(config.processor.chunker.size, Some(1024));
    }

    #[test]
    fn unknown_label_is_invalid() {
        let mut rows = rows();
        rows.downloader_type = "FTP mirror".into();
        let err = materialize(&ProjectId::new(), &rows).unwrap_err();
        assert!(matches!(err, ReadingPalError::ConfigurationInvalid { .. }));
    }

    #[tokio::test]
    async fn unconfigured_project_resolves_to_none() {
        let ctx = test_context().await;
        let project = Project::new();
        ctx.storage.insert_project(&project).await.unwrap();
        assert!(ctx.resolver.resolve(&project.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn configured_project_resolves_and_validates() {
        let ctx = test_context().await;
        let project = configured_project(&ctx).await;
        let config = ctx.resolver.resolve(&project.id).await.unwrap().unwrap();
        assert_eq!(config.project_id, project.id);
        assert_eq!(config.processor.chunker.kind, ChunkerKind::NoChunk);
    }

    #[tokio::test]
    async fn invalid_stored_row_is_rejected_on_resolve() {
        let ctx = test_context().await;
        let project = configured_project(&ctx).await;

        // Rows can change after the project was configured.
        let ollama = ctx
            .storage
            .insert_text_extractor_option("Ollama", "llama3")
            .await
            .unwrap();
        let mut selection = ctx.storage.get_project_selection(&project.id).await.unwrap().unwrap();
        selection.text_extractor_id = ollama;
        ctx.storage.set_project_config(&project.id, &selection).await.unwrap();

        let err = ctx.resolver.resolve(&project.id).await.unwrap_err();
        assert!(matches!(err, ReadingPalError::ConfigurationInvalid { .. }));
    }
}
