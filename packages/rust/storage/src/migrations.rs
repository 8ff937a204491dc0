//! SQL migration definitions for the ReadingPal database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its own version in `schema_migrations` as its last statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: project, resource, event_log, pipeline options, project_config, chat, pipelines",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS project (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS resource (
    id              TEXT PRIMARY KEY,
    project_id      TEXT NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    url             TEXT NOT NULL,
    status          TEXT NOT NULL,
    scraped_content TEXT,
    error_msg       TEXT,
    parent_id       TEXT REFERENCES resource(id) ON DELETE SET NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resource_project ON resource(project_id);

-- Append-only; seq breaks ties between equal timestamps
CREATE TABLE IF NOT EXISTS event_log (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    event_type TEXT NOT NULL,
    entity_id  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_log_project ON event_log(project_id, created_at);
CREATE INDEX IF NOT EXISTS idx_event_log_entity ON event_log(entity_id);

-- Pipeline option rows
CREATE TABLE IF NOT EXISTS downloader (
    id              INTEGER PRIMARY KEY,
    downloader_type TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS text_extractor (
    id         INTEGER PRIMARY KEY,
    provider   TEXT NOT NULL,
    model_name TEXT NOT NULL,
    UNIQUE(provider, model_name)
);

CREATE TABLE IF NOT EXISTS embedder (
    id         INTEGER PRIMARY KEY,
    provider   TEXT NOT NULL,
    model_name TEXT NOT NULL,
    UNIQUE(provider, model_name)
);

CREATE TABLE IF NOT EXISTS chunker (
    id           INTEGER PRIMARY KEY,
    chunker_type TEXT NOT NULL,
    chunk_size   INTEGER
);

CREATE TABLE IF NOT EXISTS processor (
    id             INTEGER PRIMARY KEY,
    processor_type TEXT NOT NULL,
    chunker_id     INTEGER NOT NULL REFERENCES chunker(id)
);

CREATE TABLE IF NOT EXISTS llm_model (
    id         INTEGER PRIMARY KEY,
    model_name TEXT NOT NULL UNIQUE
);

-- At most one configuration per project
CREATE TABLE IF NOT EXISTS project_config (
    project_id        TEXT PRIMARY KEY REFERENCES project(id) ON DELETE CASCADE,
    downloader_id     INTEGER NOT NULL REFERENCES downloader(id),
    text_extractor_id INTEGER NOT NULL REFERENCES text_extractor(id),
    embedder_id       INTEGER NOT NULL REFERENCES embedder(id),
    processor_id      INTEGER NOT NULL REFERENCES processor(id),
    llm_model_id      INTEGER NOT NULL REFERENCES llm_model(id),
    updated_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat (
    id         TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_project ON chat(project_id);

-- Durable step chains for out-of-process workers
CREATE TABLE IF NOT EXISTS pipelines (
    id          TEXT PRIMARY KEY,
    chain_json  TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    report_json TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status, created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Seed supported pipeline options",
            sql: r#"
INSERT OR IGNORE INTO downloader (id, downloader_type) VALUES
    (1, 'Web page scraper'),
    (2, 'Jina AI reader using Jina API');

INSERT OR IGNORE INTO text_extractor (id, provider, model_name) VALUES
    (1, 'Jina AI', 'ReaderLM-v2');

INSERT OR IGNORE INTO embedder (id, provider, model_name) VALUES
    (1, 'Jina AI', 'jina-embeddings-v4');

INSERT OR IGNORE INTO chunker (id, chunker_type, chunk_size) VALUES
    (1, 'Fixed size', 1024),
    (2, 'No chunking', NULL);

INSERT OR IGNORE INTO processor (id, processor_type, chunker_id) VALUES
    (1, 'Simple RAG', 1),
    (2, 'Simple RAG', 2);

INSERT OR IGNORE INTO llm_model (id, model_name) VALUES
    (1, 'ollama_chat/qwen3:4b');

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
