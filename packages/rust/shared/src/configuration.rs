//! Per-project pipeline configuration.
//!
//! A [`Configuration`] is an immutable snapshot of a project's stage choices,
//! materialized from storage once per planning operation. Every choice is a
//! closed enum so stage dispatch can match exhaustively.

use serde::{Deserialize, Serialize};

use crate::error::{ReadingPalError, Result};
use crate::types::ProjectId;

/// Models usable by the Jina reader endpoint.
pub const JINA_READER_MODELS: &[&str] = &[READER_LM_V2];

pub const READER_LM_V2: &str = "ReaderLM-v2";
pub const JINA_EMBEDDINGS_V4: &str = "jina-embeddings-v4";

/// Implements `as_str`, `Display` and `FromStr` over a fixed label table.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ReadingPalError;

            fn from_str(s: &str) -> Result<Self> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        ReadingPalError::configuration_invalid(format!(
                            "unknown {} '{s}'",
                            stringify!($name)
                        ))
                    })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Capability variants
// ---------------------------------------------------------------------------

/// How a resource's bytes are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloaderKind {
    WebPageScraper,
    JinaReaderApi,
}

labelled_enum!(DownloaderKind {
    WebPageScraper => "Web page scraper",
    JinaReaderApi => "Jina AI reader using Jina API",
});

/// Model providers for extraction and embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Jina,
    Ollama,
}

labelled_enum!(Provider {
    Jina => "Jina AI",
    Ollama => "Ollama",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkerKind {
    Fixed,
    NoChunk,
}

labelled_enum!(ChunkerKind {
    Fixed => "Fixed size",
    NoChunk => "No chunking",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorKind {
    SimpleRag,
}

labelled_enum!(ProcessorKind {
    SimpleRag => "Simple RAG",
});

// ---------------------------------------------------------------------------
// Stage choices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downloader {
    pub kind: DownloaderKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextExtractor {
    pub provider: Provider,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embedder {
    pub provider: Provider,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunker {
    pub kind: ChunkerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

impl std::fmt::Display for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.size {
            Some(size) => write!(f, "{}, {size}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    pub kind: ProcessorKind,
    pub chunker: Chunker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmModel {
    pub model_name: String,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resolved snapshot of a project's pipeline choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub project_id: ProjectId,
    pub downloader: Downloader,
    pub text_extractor: TextExtractor,
    pub embedder: Embedder,
    pub processor: Processor,
    pub llm_model: LlmModel,
}

impl Configuration {
    /// Enforce cross-field constraints.
    ///
    /// The Jina reader downloader only works with a Jina text extractor using
    /// one of [`JINA_READER_MODELS`].
    pub fn validate(&self) -> Result<()> {
        if self.downloader.kind == DownloaderKind::JinaReaderApi {
            if self.text_extractor.provider != Provider::Jina {
                return Err(ReadingPalError::configuration_invalid(format!(
                    "downloader '{}' requires text extractor provider '{}', got '{}'",
                    self.downloader.kind,
                    Provider::Jina,
                    self.text_extractor.provider
                )));
            }
            if !JINA_READER_MODELS.contains(&self.text_extractor.model_name.as_str()) {
                return Err(ReadingPalError::configuration_invalid(format!(
                    "downloader '{}' requires a reader model ({}), got '{}'",
                    self.downloader.kind,
                    JINA_READER_MODELS.join(", "),
                    self.text_extractor.model_name
                )));
            }
        }
        Ok(())
    }
}
