//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding projects, resources,
//! the project event log, the seeded pipeline option rows, per-project
//! configuration selections, chats, and the durable pipeline queue.
//!
//! Every method performs its own single write; there are no cross-record
//! transactions. Timestamps are stored as fixed-width RFC 3339 strings so that
//! lexical order matches chronological order.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use readingpal_shared::{
    Chat, ChatId, ChunkerKind, DownloaderKind, EventLogEntry, EventType, JINA_EMBEDDINGS_V4,
    PipelineId, ProcessorKind, Project, ProjectId, Provider, READER_LM_V2, ReadingPalError,
    Resource, ResourceId, ResourceStatus, Result,
};
use serde::{Deserialize, Serialize};

const DEFAULT_LLM_MODEL: &str = "ollama_chat/qwen3:4b";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReadingPalError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        // Cascades from project to resources/events/chats rely on this.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ReadingPalError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Project operations
    // -----------------------------------------------------------------------

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO project (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
                params![
                    project.id.to_string(),
                    format_ts(&project.created_at),
                    format_ts(&project.updated_at)
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, created_at, updated_at FROM project WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_project(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List all projects, newest first.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, created_at, updated_at FROM project ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_project(&row)?);
        }
        Ok(results)
    }

    /// Delete a project; its resources, events, chats and config row cascade.
    pub async fn delete_project(&self, id: &ProjectId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM project WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Resource operations
    // -----------------------------------------------------------------------

    pub async fn insert_resource(&self, resource: &Resource) -> Result<()> {
        let parent_id = resource.parent_id.as_ref().map(|p| p.to_string());
        self.conn
            .execute(
                "INSERT INTO resource (id, project_id, url, status, scraped_content, error_msg, parent_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    resource.id.to_string(),
                    resource.project_id.to_string(),
                    resource.url.as_str(),
                    resource.status.as_str(),
                    resource.scraped_content.as_deref(),
                    resource.error_msg.as_deref(),
                    parent_id.as_deref(),
                    format_ts(&resource.created_at),
                    format_ts(&resource.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, url, status, scraped_content, error_msg, parent_id, created_at, updated_at
                 FROM resource WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_resource(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Persist the mutable fields of `resource` in a single update.
    ///
    /// The owning project and URL are never rewritten.
    pub async fn save_resource(&self, resource: &Resource) -> Result<()> {
        let affected = self
            .conn
            .execute(
                "UPDATE resource SET status = ?1, scraped_content = ?2, error_msg = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    resource.status.as_str(),
                    resource.scraped_content.as_deref(),
                    resource.error_msg.as_deref(),
                    format_ts(&resource.updated_at),
                    resource.id.to_string(),
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(ReadingPalError::ResourceNotFound(resource.id.to_string()));
        }
        Ok(())
    }

    /// List a project's resources, most recently updated first.
    pub async fn list_resources_by_project(&self, project_id: &ProjectId) -> Result<Vec<Resource>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, url, status, scraped_content, error_msg, parent_id, created_at, updated_at
                 FROM resource WHERE project_id = ?1 ORDER BY updated_at DESC",
                params![project_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_resource(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Event log operations
    // -----------------------------------------------------------------------

    /// Append one event. The log is never updated or pruned.
    pub async fn append_event(
        &self,
        project_id: &ProjectId,
        event_type: EventType,
        entity_id: &str,
    ) -> Result<EventLogEntry> {
        let created_at = Utc::now();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO event_log (project_id, event_type, entity_id, created_at)
                 VALUES (?1, ?2, ?3, ?4) RETURNING seq",
                params![
                    project_id.to_string(),
                    event_type.as_str(),
                    entity_id,
                    format_ts(&created_at)
                ],
            )
            .await
            .map_err(db_err)?;

        let seq = match rows.next().await {
            Ok(Some(row)) => row.get::<i64>(0).map_err(db_err)?,
            Ok(None) => {
                return Err(ReadingPalError::Storage(
                    "event insert returned no sequence number".into(),
                ));
            }
            Err(e) => return Err(db_err(e)),
        };

        Ok(EventLogEntry {
            seq,
            project_id: project_id.clone(),
            event_type,
            entity_id: entity_id.to_string(),
            created_at,
        })
    }

    /// A project's events in creation order.
    pub async fn list_events_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT seq, project_id, event_type, entity_id, created_at
             FROM event_log WHERE project_id = ?1 ORDER BY created_at, seq",
            project_id.to_string(),
        )
        .await
    }

    /// All events recorded against one entity, in creation order.
    pub async fn list_events_for_entity(&self, entity_id: &str) -> Result<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT seq, project_id, event_type, entity_id, created_at
             FROM event_log WHERE entity_id = ?1 ORDER BY created_at, seq",
            entity_id.to_string(),
        )
        .await
    }

    async fn query_events(&self, sql: &str, key: String) -> Result<Vec<EventLogEntry>> {
        let mut rows = self.conn.query(sql, params![key]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_event(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Pipeline option rows
    // -----------------------------------------------------------------------

    /// All selectable option rows, for configuration prompts.
    pub async fn list_options(&self) -> Result<PipelineOptions> {
        Ok(PipelineOptions {
            downloaders: self
                .query_option_rows("SELECT id, downloader_type FROM downloader ORDER BY id")
                .await?,
            text_extractors: self
                .query_option_rows(
                    "SELECT id, provider || ' / ' || model_name FROM text_extractor ORDER BY id",
                )
                .await?,
            embedders: self
                .query_option_rows(
                    "SELECT id, provider || ' / ' || model_name FROM embedder ORDER BY id",
                )
                .await?,
            chunkers: self
                .query_option_rows(
                    "SELECT id, chunker_type || COALESCE(', ' || chunk_size, '') FROM chunker ORDER BY id",
                )
                .await?,
            processors: self
                .query_option_rows(
                    "SELECT p.id, p.processor_type || ' (' || c.chunker_type || COALESCE(', ' || c.chunk_size, '') || ')'
                     FROM processor p JOIN chunker c ON c.id = p.chunker_id ORDER BY p.id",
                )
                .await?,
            llm_models: self
                .query_option_rows("SELECT id, model_name FROM llm_model ORDER BY id")
                .await?,
        })
    }

    async fn query_option_rows(&self, sql: &str) -> Result<Vec<OptionRow>> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(OptionRow {
                id: row.get::<i64>(0).map_err(db_err)?,
                label: row.get::<String>(1).map_err(db_err)?,
            });
        }
        Ok(results)
    }

    /// The seeded default choice: Jina reader API, ReaderLM-v2, Jina
    /// embeddings, Simple RAG without chunking, and the local qwen3 model.
    pub async fn default_selection(&self) -> Result<ConfigSelection> {
        let mut rows = self
            .conn
            .query(
                "SELECT
                    (SELECT id FROM downloader WHERE downloader_type = ?1),
                    (SELECT id FROM text_extractor WHERE provider = ?2 AND model_name = ?3),
                    (SELECT id FROM embedder WHERE provider = ?2 AND model_name = ?4),
                    (SELECT p.id FROM processor p JOIN chunker c ON c.id = p.chunker_id
                       WHERE p.processor_type = ?5 AND c.chunker_type = ?6),
                    (SELECT id FROM llm_model WHERE model_name = ?7)",
                params![
                    DownloaderKind::JinaReaderApi.as_str(),
                    Provider::Jina.as_str(),
                    READER_LM_V2,
                    JINA_EMBEDDINGS_V4,
                    ProcessorKind::SimpleRag.as_str(),
                    ChunkerKind::NoChunk.as_str(),
                    DEFAULT_LLM_MODEL,
                ],
            )
            .await
            .map_err(db_err)?;

        let missing = || ReadingPalError::Storage("seeded option rows are missing".into());
        match rows.next().await {
            Ok(Some(row)) => Ok(ConfigSelection {
                downloader_id: row.get::<i64>(0).map_err(|_| missing())?,
                text_extractor_id: row.get::<i64>(1).map_err(|_| missing())?,
                embedder_id: row.get::<i64>(2).map_err(|_| missing())?,
                processor_id: row.get::<i64>(3).map_err(|_| missing())?,
                llm_model_id: row.get::<i64>(4).map_err(|_| missing())?,
            }),
            Ok(None) => Err(missing()),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Register an extra text extractor row. Returns its id; an existing
    /// `(provider, model_name)` pair returns the existing id.
    pub async fn insert_text_extractor_option(&self, provider: &str, model_name: &str) -> Result<i64> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO text_extractor (provider, model_name) VALUES (?1, ?2)",
                params![provider, model_name],
            )
            .await
            .map_err(db_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM text_extractor WHERE provider = ?1 AND model_name = ?2",
                params![provider, model_name],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => row.get::<i64>(0).map_err(db_err),
            Ok(None) => Err(ReadingPalError::Storage(format!(
                "text extractor '{provider} / {model_name}' was not stored"
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Project configuration rows
    // -----------------------------------------------------------------------

    /// Insert or replace the project's configuration selection.
    pub async fn set_project_config(
        &self,
        project_id: &ProjectId,
        selection: &ConfigSelection,
    ) -> Result<()> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO project_config (project_id, downloader_id, text_extractor_id, embedder_id, processor_id, llm_model_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(project_id) DO UPDATE SET
                   downloader_id = excluded.downloader_id,
                   text_extractor_id = excluded.text_extractor_id,
                   embedder_id = excluded.embedder_id,
                   processor_id = excluded.processor_id,
                   llm_model_id = excluded.llm_model_id,
                   updated_at = excluded.updated_at",
                params![
                    project_id.to_string(),
                    selection.downloader_id,
                    selection.text_extractor_id,
                    selection.embedder_id,
                    selection.processor_id,
                    selection.llm_model_id,
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// The project's raw selection ids, if it has a configuration row.
    pub async fn get_project_selection(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<ConfigSelection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT downloader_id, text_extractor_id, embedder_id, processor_id, llm_model_id
                 FROM project_config WHERE project_id = ?1",
                params![project_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(ConfigSelection {
                downloader_id: row.get::<i64>(0).map_err(db_err)?,
                text_extractor_id: row.get::<i64>(1).map_err(db_err)?,
                embedder_id: row.get::<i64>(2).map_err(db_err)?,
                processor_id: row.get::<i64>(3).map_err(db_err)?,
                llm_model_id: row.get::<i64>(4).map_err(db_err)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// The project's configuration with every referenced option row joined
    /// in. `None` when the project has no configuration row.
    pub async fn load_configuration_rows(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<ConfigurationRows>> {
        let mut rows = self
            .conn
            .query(
                "SELECT d.downloader_type, te.provider, te.model_name, e.provider, e.model_name,
                        c.chunker_type, c.chunk_size, p.processor_type, m.model_name
                 FROM project_config pc
                 JOIN downloader d ON d.id = pc.downloader_id
                 JOIN text_extractor te ON te.id = pc.text_extractor_id
                 JOIN embedder e ON e.id = pc.embedder_id
                 JOIN processor p ON p.id = pc.processor_id
                 JOIN chunker c ON c.id = p.chunker_id
                 JOIN llm_model m ON m.id = pc.llm_model_id
                 WHERE pc.project_id = ?1",
                params![project_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_configuration_rows(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Join the option rows named by `selection`. `None` when any id is unknown.
    pub async fn load_selection_rows(
        &self,
        selection: &ConfigSelection,
    ) -> Result<Option<ConfigurationRows>> {
        let mut rows = self
            .conn
            .query(
                "SELECT d.downloader_type, te.provider, te.model_name, e.provider, e.model_name,
                        c.chunker_type, c.chunk_size, p.processor_type, m.model_name
                 FROM downloader d, text_extractor te, embedder e,
                      processor p JOIN chunker c ON c.id = p.chunker_id, llm_model m
                 WHERE d.id = ?1 AND te.id = ?2 AND e.id = ?3 AND p.id = ?4 AND m.id = ?5",
                params![
                    selection.downloader_id,
                    selection.text_extractor_id,
                    selection.embedder_id,
                    selection.processor_id,
                    selection.llm_model_id,
                ],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_configuration_rows(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Chat operations
    // -----------------------------------------------------------------------

    pub async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO chat (id, project_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    chat.id.to_string(),
                    chat.project_id.to_string(),
                    chat.name.as_str(),
                    format_ts(&chat.created_at)
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn list_chats(&self, project_id: &ProjectId) -> Result<Vec<Chat>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, name, created_at FROM chat
                 WHERE project_id = ?1 ORDER BY created_at DESC",
                params![project_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(Chat {
                id: parse_id::<ChatId>(&row.get::<String>(0).map_err(db_err)?)?,
                project_id: parse_id::<ProjectId>(&row.get::<String>(1).map_err(db_err)?)?,
                name: row.get::<String>(2).map_err(db_err)?,
                created_at: parse_ts(&row.get::<String>(3).map_err(db_err)?)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Pipeline queue operations
    // -----------------------------------------------------------------------

    /// Enqueue a serialized step chain as `pending`.
    pub async fn insert_pipeline(&self, id: &PipelineId, chain_json: &str) -> Result<()> {
        let now = format_ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO pipelines (id, chain_json, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    chain_json,
                    PipelineStatus::Pending.as_str(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Oldest pending pipelines, up to `limit`.
    pub async fn list_pending_pipelines(&self, limit: u32) -> Result<Vec<PipelineRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, chain_json, status, report_json, created_at, updated_at
                 FROM pipelines WHERE status = ?1 ORDER BY created_at LIMIT ?2",
                params![PipelineStatus::Pending.as_str(), limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_pipeline(&row)?);
        }
        Ok(results)
    }

    /// Move a pipeline from `pending` to `running`.
    ///
    /// Returns `false` when another worker claimed it first.
    pub async fn claim_pipeline(&self, id: &PipelineId) -> Result<bool> {
        let now = format_ts(&Utc::now());
        let affected = self
            .conn
            .execute(
                "UPDATE pipelines SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![
                    PipelineStatus::Running.as_str(),
                    now.as_str(),
                    id.to_string(),
                    PipelineStatus::Pending.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(affected == 1)
    }

    /// Record the final status and report of a claimed pipeline.
    pub async fn finish_pipeline(
        &self,
        id: &PipelineId,
        status: PipelineStatus,
        report_json: Option<&str>,
    ) -> Result<()> {
        let now = format_ts(&Utc::now());
        let affected = self
            .conn
            .execute(
                "UPDATE pipelines SET status = ?1, report_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), report_json, now.as_str(), id.to_string()],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(ReadingPalError::Storage(format!("pipeline not found: {id}")));
        }
        Ok(())
    }

    /// Remove a pipeline row. Returns `false` if it did not exist.
    pub async fn delete_pipeline(&self, id: &PipelineId) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM pipelines WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    pub async fn get_pipeline(&self, id: &PipelineId) -> Result<Option<PipelineRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, chain_json, status, report_json, created_at, updated_at
                 FROM pipelines WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_pipeline(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One selectable option row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRow {
    pub id: i64,
    pub label: String,
}

/// Every option table's rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub downloaders: Vec<OptionRow>,
    pub text_extractors: Vec<OptionRow>,
    pub embedders: Vec<OptionRow>,
    pub chunkers: Vec<OptionRow>,
    pub processors: Vec<OptionRow>,
    pub llm_models: Vec<OptionRow>,
}

/// Option-row ids chosen for a project. The chunker is implied by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSelection {
    pub downloader_id: i64,
    pub text_extractor_id: i64,
    pub embedder_id: i64,
    pub processor_id: i64,
    pub llm_model_id: i64,
}

/// Raw joined labels of a configuration, before parsing into typed variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRows {
    pub downloader_type: String,
    pub text_extractor_provider: String,
    pub text_extractor_model: String,
    pub embedder_provider: String,
    pub embedder_model: String,
    pub chunker_type: String,
    pub chunk_size: Option<i64>,
    pub processor_type: String,
    pub llm_model: String,
}

/// Lifecycle of a queued pipeline row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Pending,
    Running,
    Completed,
    Halted,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Halted => "halted",
        }
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = ReadingPalError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "halted" => Ok(Self::Halted),
            other => Err(ReadingPalError::Storage(format!(
                "unknown pipeline status: {other}"
            ))),
        }
    }
}

/// A row of the durable pipeline queue.
#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub chain_json: String,
    pub status: PipelineStatus,
    pub report_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> ReadingPalError {
    ReadingPalError::Storage(e.to_string())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReadingPalError::Storage(format!("invalid date: {e}")))
}

fn parse_id<T>(s: &str) -> Result<T>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    s.parse::<T>()
        .map_err(|e| ReadingPalError::Storage(format!("invalid id '{s}': {e}")))
}

fn row_to_project(row: &libsql::Row) -> Result<Project> {
    Ok(Project {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        created_at: parse_ts(&row.get::<String>(1).map_err(db_err)?)?,
        updated_at: parse_ts(&row.get::<String>(2).map_err(db_err)?)?,
    })
}

fn row_to_resource(row: &libsql::Row) -> Result<Resource> {
    let status: String = row.get(3).map_err(db_err)?;
    Ok(Resource {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        project_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
        url: row.get::<String>(2).map_err(db_err)?,
        status: status
            .parse::<ResourceStatus>()
            .map_err(|e| ReadingPalError::Storage(e.to_string()))?,
        scraped_content: row.get::<String>(4).ok(),
        error_msg: row.get::<String>(5).ok(),
        parent_id: match row.get::<String>(6).ok() {
            Some(s) => Some(parse_id(&s)?),
            None => None,
        },
        created_at: parse_ts(&row.get::<String>(7).map_err(db_err)?)?,
        updated_at: parse_ts(&row.get::<String>(8).map_err(db_err)?)?,
    })
}

fn row_to_event(row: &libsql::Row) -> Result<EventLogEntry> {
    let event_type: String = row.get(2).map_err(db_err)?;
    Ok(EventLogEntry {
        seq: row.get::<i64>(0).map_err(db_err)?,
        project_id: parse_id(&row.get::<String>(1).map_err(db_err)?)?,
        event_type: event_type
            .parse::<EventType>()
            .map_err(|e| ReadingPalError::Storage(e.to_string()))?,
        entity_id: row.get::<String>(3).map_err(db_err)?,
        created_at: parse_ts(&row.get::<String>(4).map_err(db_err)?)?,
    })
}

fn row_to_configuration_rows(row: &libsql::Row) -> Result<ConfigurationRows> {
    Ok(ConfigurationRows {
        downloader_type: row.get::<String>(0).map_err(db_err)?,
        text_extractor_provider: row.get::<String>(1).map_err(db_err)?,
        text_extractor_model: row.get::<String>(2).map_err(db_err)?,
        embedder_provider: row.get::<String>(3).map_err(db_err)?,
        embedder_model: row.get::<String>(4).map_err(db_err)?,
        chunker_type: row.get::<String>(5).map_err(db_err)?,
        chunk_size: row.get::<i64>(6).ok(),
        processor_type: row.get::<String>(7).map_err(db_err)?,
        llm_model: row.get::<String>(8).map_err(db_err)?,
    })
}

fn row_to_pipeline(row: &libsql::Row) -> Result<PipelineRecord> {
    let status: String = row.get(2).map_err(db_err)?;
    Ok(PipelineRecord {
        id: parse_id(&row.get::<String>(0).map_err(db_err)?)?,
        chain_json: row.get::<String>(1).map_err(db_err)?,
        status: status.parse()?,
        report_json: row.get::<String>(3).ok(),
        created_at: parse_ts(&row.get::<String>(4).map_err(db_err)?)?,
        updated_at: parse_ts(&row.get::<String>(5).map_err(db_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("rp_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    async fn stored_project(storage: &Storage) -> Project {
        let project = Project::new();
        storage.insert_project(&project).await.expect("insert project");
        project
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("rp_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
        let options = s2.list_options().await.unwrap();
        assert_eq!(options.downloaders.len(), 2);
    }

    #[tokio::test]
    async fn project_crud() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;

        let found = storage.get_project(&project.id).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(project.id.clone()));

        assert_eq!(storage.list_projects().await.unwrap().len(), 1);
        assert!(storage.get_project(&ProjectId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resource_save_updates_mutable_fields() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;

        let mut resource = Resource::new(ResourceId::new(), project.id.clone(), "https://example.com/a");
        storage.insert_resource(&resource).await.expect("insert resource");

        resource.status = ResourceStatus::Scraped;
        resource.scraped_content = Some("hello world".into());
        resource.updated_at = Utc::now();
        storage.save_resource(&resource).await.expect("save resource");

        let found = storage.get_resource(&resource.id).await.unwrap().unwrap();
        assert_eq!(found.status, ResourceStatus::Scraped);
        assert_eq!(found.scraped_content.as_deref(), Some("hello world"));
        assert!(found.error_msg.is_none());
        assert_eq!(found.project_id, project.id);
    }

    #[tokio::test]
    async fn save_missing_resource_is_not_found() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;
        let ghost = Resource::new(ResourceId::new(), project.id, "https://example.com/ghost");

        let err = storage.save_resource(&ghost).await.unwrap_err();
        assert!(matches!(err, ReadingPalError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn events_are_ordered_by_insertion() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;
        let entity = ResourceId::new().to_string();

        for kind in [
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::DownloadedAndTextExtracted,
        ] {
            storage
                .append_event(&project.id, kind, &entity)
                .await
                .expect("append event");
        }

        let events = storage.list_events_for_project(&project.id).await.unwrap();
        let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::ResourceAdded,
                EventType::ProcessingStarted,
                EventType::DownloadedAndTextExtracted
            ]
        );
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

        let by_entity = storage.list_events_for_entity(&entity).await.unwrap();
        assert_eq!(by_entity.len(), 3);
    }

    #[tokio::test]
    async fn deleting_project_cascades() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;
        let resource = Resource::new(ResourceId::new(), project.id.clone(), "https://example.com/a");
        storage.insert_resource(&resource).await.unwrap();
        storage
            .append_event(&project.id, EventType::ResourceAdded, &resource.id.to_string())
            .await
            .unwrap();

        assert!(storage.delete_project(&project.id).await.unwrap());
        assert!(storage.get_resource(&resource.id).await.unwrap().is_none());
        assert!(
            storage
                .list_events_for_project(&project.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn default_selection_resolves_seeded_rows() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;

        assert!(storage.load_configuration_rows(&project.id).await.unwrap().is_none());

        let selection = storage.default_selection().await.expect("default selection");
        storage.set_project_config(&project.id, &selection).await.unwrap();

        let rows = storage
            .load_configuration_rows(&project.id)
            .await
            .unwrap()
            .expect("configuration rows");
        assert_eq!(rows.downloader_type, "Jina AI reader using Jina API");
        assert_eq!(rows.text_extractor_provider, "Jina AI");
        assert_eq!(rows.text_extractor_model, "ReaderLM-v2");
        assert_eq!(rows.chunker_type, "No chunking");
        assert_eq!(rows.chunk_size, None);
        assert_eq!(rows.processor_type, "Simple RAG");

        assert_eq!(
            storage.get_project_selection(&project.id).await.unwrap(),
            Some(selection)
        );
    }

    #[tokio::test]
    async fn project_config_upsert_replaces_row() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;
        let mut selection = storage.default_selection().await.unwrap();
        storage.set_project_config(&project.id, &selection).await.unwrap();

        // Switch to the fixed-size chunker processor.
        let options = storage.list_options().await.unwrap();
        let fixed = options
            .processors
            .iter()
            .find(|p| p.label.contains("Fixed size"))
            .expect("fixed-size processor row");
        selection.processor_id = fixed.id;
        storage.set_project_config(&project.id, &selection).await.unwrap();

        let rows = storage.load_configuration_rows(&project.id).await.unwrap().unwrap();
        assert_eq!(rows.chunker_type, "Fixed size");
        assert_eq!(rows.chunk_size, Some(1024));
    }

    #[tokio::test]
    async fn selection_rows_with_unknown_id_are_absent() {
        let storage = test_storage().await;
        let mut selection = storage.default_selection().await.unwrap();
        assert!(storage.load_selection_rows(&selection).await.unwrap().is_some());

        selection.downloader_id = 999;
        assert!(storage.load_selection_rows(&selection).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn text_extractor_option_insert_is_idempotent() {
        let storage = test_storage().await;
        let id = storage
            .insert_text_extractor_option("Ollama", "llama3")
            .await
            .unwrap();
        let again = storage
            .insert_text_extractor_option("Ollama", "llama3")
            .await
            .unwrap();
        assert_eq!(id, again);

        let options = storage.list_options().await.unwrap();
        assert!(options.text_extractors.iter().any(|o| o.label == "Ollama / llama3"));
    }

    #[tokio::test]
    async fn chats_are_listed_per_project() {
        let storage = test_storage().await;
        let project = stored_project(&storage).await;
        let chat = Chat {
            id: ChatId::new(),
            project_id: project.id.clone(),
            name: "first".into(),
            created_at: Utc::now(),
        };
        storage.insert_chat(&chat).await.unwrap();

        let chats = storage.list_chats(&project.id).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].id, chat.id);
        assert_eq!(chats[0].name, "first");
    }

    #[tokio::test]
    async fn pipeline_claim_is_exclusive() {
        let storage = test_storage().await;
        let id = PipelineId::new();
        storage.insert_pipeline(&id, r#"{"steps":[]}"#).await.unwrap();

        let pending = storage.list_pending_pipelines(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, PipelineStatus::Pending);

        assert!(storage.claim_pipeline(&id).await.unwrap());
        assert!(!storage.claim_pipeline(&id).await.unwrap());
        assert!(storage.list_pending_pipelines(10).await.unwrap().is_empty());

        storage
            .finish_pipeline(&id, PipelineStatus::Completed, Some(r#"{"halted":false}"#))
            .await
            .unwrap();
        let record = storage.get_pipeline(&id).await.unwrap().unwrap();
        assert_eq!(record.status, PipelineStatus::Completed);
        assert!(record.report_json.is_some());
    }

    #[tokio::test]
    async fn finishing_a_deleted_pipeline_fails() {
        let storage = test_storage().await;
        let id = PipelineId::new();
        storage.insert_pipeline(&id, r#"{"steps":[]}"#).await.unwrap();

        assert!(storage.delete_pipeline(&id).await.unwrap());
        assert!(!storage.delete_pipeline(&id).await.unwrap());

        let err = storage
            .finish_pipeline(&id, PipelineStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadingPalError::Storage(_)));
    }
}
