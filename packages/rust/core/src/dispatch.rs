//! Stage Dispatcher: per-stage selection of the work-unit to run.
//!
//! Every function here is pure over the resolved [`Configuration`] and is
//! only called at planning time, so an in-flight pipeline never changes
//! behaviour when its project is reconfigured.

use std::time::Duration;

use readingpal_runtime::JobSpec;
use readingpal_shared::{
    ChunkerKind, Configuration, Downloader, DownloaderKind, ProcessorKind, Provider,
    ReadingPalError, Result, STAGE_TIMEOUT_SECS, TextExtractor,
};

/// Timeout for every pipeline job. Kept short so failures surface quickly
/// to an interactive caller.
pub const STAGE_TIMEOUT: Duration = Duration::from_secs(STAGE_TIMEOUT_SECS);

/// Schedulable, runtime-invokable pipeline functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkUnit {
    /// Download and text extraction through the Jina reader API.
    JinaReader,
    /// Minimal processing step that finalizes the resource.
    SimpleRag,
}

impl WorkUnit {
    pub fn spec(&self) -> JobSpec {
        match self {
            Self::JinaReader => JobSpec {
                name: "jina_reader_extract",
                timeout: STAGE_TIMEOUT,
            },
            Self::SimpleRag => JobSpec {
                name: "simple_rag",
                timeout: STAGE_TIMEOUT,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Download and text extraction
// ---------------------------------------------------------------------------

/// `Ok(None)` means the downloader has no separate action of its own; the
/// reader API downloads as part of text extraction.
pub fn download_stage(downloader: &Downloader) -> Result<Option<WorkUnit>> {
    match downloader.kind {
        DownloaderKind::JinaReaderApi => Ok(None),
        other => Err(ReadingPalError::UnsupportedDownloader {
            downloader: other.to_string(),
            supported: vec![DownloaderKind::JinaReaderApi.to_string()],
        }),
    }
}

pub fn text_extraction_stage(extractor: &TextExtractor) -> Result<WorkUnit> {
    match extractor.provider {
        Provider::Jina => Ok(WorkUnit::JinaReader),
        other => Err(ReadingPalError::UnsupportedTextExtractor {
            provider: other.to_string(),
            supported: vec![Provider::Jina.to_string()],
        }),
    }
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// Ordered transforms making up the processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Chunk,
    Embed,
    Rag,
}

impl ProcessingStage {
    pub const ORDER: [ProcessingStage; 3] = [Self::Chunk, Self::Embed, Self::Rag];

    /// Work-units this transform contributes, `None` when it has nothing to run.
    pub fn dispatch(&self, config: &Configuration) -> Result<Option<Vec<WorkUnit>>> {
        match self {
            Self::Chunk => {
                let chunker = &config.processor.chunker;
                match chunker.kind {
                    ChunkerKind::NoChunk => Ok(None),
                    ChunkerKind::Fixed => Err(ReadingPalError::UnsupportedChunker {
                        chunker: chunker.to_string(),
                        supported: vec![ChunkerKind::NoChunk.to_string()],
                    }),
                }
            }
            // No embedding work-unit exists yet; every embedder choice is accepted.
            Self::Embed => Ok(None),
            Self::Rag => match config.processor.kind {
                ProcessorKind::SimpleRag => Ok(Some(vec![WorkUnit::SimpleRag])),
            },
        }
    }
}

/// Step groups for the processing stage, in execution order.
pub fn processing_stage(config: &Configuration) -> Result<Vec<Vec<WorkUnit>>> {
    let mut groups = Vec::new();
    for stage in ProcessingStage::ORDER {
        if let Some(units) = stage.dispatch(config)? {
            groups.push(units);
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use readingpal_shared::ProjectId;

    use super::*;
    use crate::test_support::jina_configuration;

    #[test]
    fn jina_downloader_is_a_no_op() {
        let config = jina_configuration(ProjectId::new());
        assert_eq!(download_stage(&config.downloader).unwrap(), None);
    }

    #[test]
    fn scraper_downloader_is_unsupported() {
        let err = download_stage(&Downloader {
            kind: DownloaderKind::WebPageScraper,
        })
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Web page scraper"));
        assert!(msg.contains("Jina AI reader using Jina API"));
    }

    #[test]
    fn text_extraction_requires_jina() {
        let mut config = jina_configuration(ProjectId::new());
        assert_eq!(
            text_extraction_stage(&config.text_extractor).unwrap(),
            WorkUnit::JinaReader
        );

        config.text_extractor.provider = Provider::Ollama;
        match text_extraction_stage(&config.text_extractor).unwrap_err() {
            ReadingPalError::UnsupportedTextExtractor { provider, supported } => {
                assert_eq!(provider, "Ollama");
                assert_eq!(supported, vec!["Jina AI".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn no_chunking_yields_single_rag_group() {
        let config = jina_configuration(ProjectId::new());
        assert_eq!(
            processing_stage(&config).unwrap(),
            vec![vec![WorkUnit::SimpleRag]]
        );
    }

    #[test]
    fn fixed_chunker_is_unsupported() {
        let mut config = jina_configuration(ProjectId::new());
        config.processor.chunker.kind = ChunkerKind::Fixed;
        config.processor.chunker.size = Some(1024);
        let err = processing_stage(&config).unwrap_err();
        assert!(matches!(err, ReadingPalError::UnsupportedChunker { .. }));
        assert!(err.to_string().contains("Fixed size, 1024"));
    }

    #[test]
    fn work_units_have_distinct_names() {
        assert_ne!(WorkUnit::JinaReader.spec().name, WorkUnit::SimpleRag.spec().name);
        assert_eq!(WorkUnit::SimpleRag.spec().timeout, STAGE_TIMEOUT);
    }
}
