//! Shared types, error model, and configuration for ReadingPal.
//!
//! This crate is the foundation depended on by all other ReadingPal crates.
//! It provides:
//! - [`ReadingPalError`]: the unified error type
//! - Domain types ([`Project`], [`Resource`], [`EventLogEntry`], [`Chat`] and their ids)
//! - The per-project pipeline [`Configuration`] and its validation
//! - Application configuration ([`AppConfig`], config loading)

pub mod config;
pub mod configuration;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ReaderConfig, STAGE_TIMEOUT_SECS, StorageConfig, WorkerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, reader_api_key,
};
pub use configuration::{
    Chunker, ChunkerKind, Configuration, Downloader, DownloaderKind, Embedder,
    JINA_EMBEDDINGS_V4, JINA_READER_MODELS, LlmModel, Processor, ProcessorKind, Provider,
    READER_LM_V2, TextExtractor,
};
pub use error::{ReadingPalError, Result};
pub use types::{
    Chat, ChatId, EventLogEntry, EventType, PipelineId, Project, ProjectId, Resource, ResourceId,
    ResourceStatus,
};
