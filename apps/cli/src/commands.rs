//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use readingpal_core::{
    AddResource, ChatManager, CoreContext, Planner, ProjectManager, ResourceProgress,
    build_registry, reconcile_project,
};
use readingpal_reader::{ReaderClient, ReaderOptions};
use readingpal_runtime::{JobRuntime, LocalRuntime, QueuedRuntime, Worker, WorkerOptions};
use readingpal_shared::{
    AppConfig, Configuration, PipelineId, ProjectId, Resource, ResourceId, init_config,
    load_config,
};
use readingpal_storage::{ConfigSelection, OptionRow, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ReadingPal: collect web pages into projects and prepare them for chat.
#[derive(Parser)]
#[command(
    name = "readingpal",
    version,
    about = "Collect web resources into projects and run them through the extraction pipeline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `[storage] database_path`).
    #[arg(long, global = true, env = "READINGPAL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Project management.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// List the selectable pipeline options.
    Options,

    /// Add and inspect resources.
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Print a project's event log.
    Events {
        /// Project ID.
        project: String,

        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Chat management.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },

    /// Run queued pipelines.
    Worker {
        /// Process one batch of pending pipelines and exit.
        #[arg(long)]
        once: bool,
    },

    /// Restore event log entries implied by stored resource states.
    Reconcile {
        /// Project ID.
        project: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Project subcommands.
#[derive(Subcommand)]
pub(crate) enum ProjectAction {
    /// Create an empty, unconfigured project.
    Create,
    /// List all projects.
    List,
    /// Show a project's configuration, resources and chats.
    Show {
        /// Project ID.
        project: String,
    },
    /// Choose the project's pipeline options. Unset options use the defaults.
    Configure {
        /// Project ID.
        project: String,

        /// Downloader option ID.
        #[arg(long)]
        downloader: Option<i64>,

        /// Text extractor option ID.
        #[arg(long)]
        text_extractor: Option<i64>,

        /// Embedder option ID.
        #[arg(long)]
        embedder: Option<i64>,

        /// Processor option ID.
        #[arg(long)]
        processor: Option<i64>,

        /// LLM model option ID.
        #[arg(long)]
        llm_model: Option<i64>,
    },
}

/// Resource subcommands.
#[derive(Subcommand)]
pub(crate) enum ResourceAction {
    /// Add a URL to a project and plan its pipeline.
    Add {
        /// Project ID.
        project: String,

        /// Page URL (http or https).
        url: String,

        /// Run the pipeline in this process instead of queueing it.
        #[arg(long)]
        inline: bool,

        /// After queueing, wait until a worker finishes the resource.
        #[arg(long, conflicts_with = "inline")]
        wait: bool,
    },
    /// List a project's resources, most recently updated first.
    List {
        /// Project ID.
        project: String,
    },
    /// Show one resource, including extracted text or error details.
    Show {
        /// Resource ID.
        resource: String,
    },
}

/// Chat subcommands.
#[derive(Subcommand)]
pub(crate) enum ChatAction {
    /// Create a chat in a configured project.
    Create {
        /// Project ID.
        project: String,

        /// Chat name.
        name: String,
    },
    /// List a project's chats.
    List {
        /// Project ID.
        project: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "readingpal=info",
        1 => "readingpal=debug",
        _ => "readingpal=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Config commands must work before a database exists.
    let command = match cli.command {
        Command::Config { action } => return cmd_config(action).await,
        command => command,
    };

    let app = App::open(cli.db.as_deref()).await?;
    match command {
        Command::Project { action } => match action {
            ProjectAction::Create => cmd_project_create(&app).await,
            ProjectAction::List => cmd_project_list(&app).await,
            ProjectAction::Show { project } => cmd_project_show(&app, &project).await,
            ProjectAction::Configure {
                project,
                downloader,
                text_extractor,
                embedder,
                processor,
                llm_model,
            } => {
                let overrides = SelectionOverrides {
                    downloader,
                    text_extractor,
                    embedder,
                    processor,
                    llm_model,
                };
                cmd_project_configure(&app, &project, overrides).await
            }
        },
        Command::Options => cmd_options(&app).await,
        Command::Resource { action } => match action {
            ResourceAction::Add {
                project,
                url,
                inline,
                wait,
            } => cmd_resource_add(&app, &project, &url, inline, wait).await,
            ResourceAction::List { project } => cmd_resource_list(&app, &project).await,
            ResourceAction::Show { resource } => cmd_resource_show(&app, &resource).await,
        },
        Command::Events { project, json } => cmd_events(&app, &project, json).await,
        Command::Chat { action } => match action {
            ChatAction::Create { project, name } => cmd_chat_create(&app, &project, &name).await,
            ChatAction::List { project } => cmd_chat_list(&app, &project).await,
        },
        Command::Worker { once } => cmd_worker(&app, once).await,
        Command::Reconcile { project } => cmd_reconcile(&app, &project).await,
        Command::Config { action } => cmd_config(action).await,
    }
}

// ---------------------------------------------------------------------------
// Application context
// ---------------------------------------------------------------------------

/// Loaded config plus an open database, shared by every command.
struct App {
    config: AppConfig,
    storage: Arc<Storage>,
    ctx: CoreContext,
}

impl App {
    async fn open(db: Option<&Path>) -> Result<Self> {
        let config = load_config()?;
        let path = match db {
            Some(p) => p.to_path_buf(),
            None => config.database_path()?,
        };
        info!(path = %path.display(), "opening database");

        let storage = Arc::new(Storage::open(&path).await?);
        let ctx = CoreContext::new(Arc::clone(&storage));
        Ok(Self {
            config,
            storage,
            ctx,
        })
    }

    fn reader(&self) -> Result<Arc<ReaderClient>> {
        let client = ReaderClient::new(ReaderOptions::from_config(&self.config))?;
        Ok(Arc::new(client))
    }

    fn projects(&self, runtime: Arc<dyn JobRuntime>) -> ProjectManager {
        ProjectManager::new(self.ctx.clone(), Planner::new(runtime))
    }

    /// Project manager whose pipelines go to the durable queue.
    fn queued_projects(&self) -> ProjectManager {
        self.projects(Arc::new(QueuedRuntime::new(Arc::clone(&self.storage))))
    }
}

fn parse_id<T>(kind: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid {kind} ID '{raw}': {e}"))
}

fn spinner(message: String) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map_err(|e| eyre!("invalid progress template: {e}"))?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    Ok(spinner)
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

async fn cmd_project_create(app: &App) -> Result<()> {
    let project = app.queued_projects().create_project().await?;
    println!("Created {}", project.display_id());
    println!("Configure it with: readingpal project configure {}", project.id);
    Ok(())
}

async fn cmd_project_list(app: &App) -> Result<()> {
    let projects = app.queued_projects().list_projects().await?;
    if projects.is_empty() {
        println!("No projects yet. Create one with: readingpal project create");
        return Ok(());
    }
    for project in projects {
        println!(
            "  {}  created {}",
            project.display_id(),
            project.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn cmd_project_show(app: &App, project: &str) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let overview = app.queued_projects().overview(&project_id).await?;

    println!();
    println!("  {}", overview.project.display_id());
    println!();
    match &overview.configuration {
        Some(configuration) => print_configuration(configuration),
        None => println!("  Not configured."),
    }
    println!();
    println!("  Resources ({}):", overview.resources.len());
    for resource in &overview.resources {
        println!("    {}  {:<10}  {}", resource.id, resource.status, resource.url);
    }
    println!("  Chats ({}):", overview.chats.len());
    for chat in &overview.chats {
        println!("    {}  {}", chat.id, chat.name);
    }
    println!();
    Ok(())
}

fn print_configuration(configuration: &Configuration) {
    println!("  Downloader:     {}", configuration.downloader.kind);
    println!(
        "  Text extractor: {} / {}",
        configuration.text_extractor.provider, configuration.text_extractor.model_name
    );
    println!(
        "  Embedder:       {} / {}",
        configuration.embedder.provider, configuration.embedder.model_name
    );
    println!(
        "  Processor:      {} ({})",
        configuration.processor.kind, configuration.processor.chunker
    );
    println!("  LLM model:      {}", configuration.llm_model.model_name);
}

/// Option IDs given on the command line; `None` falls back to the default.
struct SelectionOverrides {
    downloader: Option<i64>,
    text_extractor: Option<i64>,
    embedder: Option<i64>,
    processor: Option<i64>,
    llm_model: Option<i64>,
}

impl SelectionOverrides {
    fn apply(self, defaults: ConfigSelection) -> ConfigSelection {
        ConfigSelection {
            downloader_id: self.downloader.unwrap_or(defaults.downloader_id),
            text_extractor_id: self.text_extractor.unwrap_or(defaults.text_extractor_id),
            embedder_id: self.embedder.unwrap_or(defaults.embedder_id),
            processor_id: self.processor.unwrap_or(defaults.processor_id),
            llm_model_id: self.llm_model.unwrap_or(defaults.llm_model_id),
        }
    }
}

async fn cmd_project_configure(
    app: &App,
    project: &str,
    overrides: SelectionOverrides,
) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let projects = app.queued_projects();
    let selection = overrides.apply(projects.default_selection().await?);

    let configuration = projects.configure_project(&project_id, &selection).await?;
    println!();
    println!("  Project configured.");
    print_configuration(&configuration);
    println!();
    Ok(())
}

async fn cmd_options(app: &App) -> Result<()> {
    let projects = app.queued_projects();
    let options = projects.options().await?;
    let defaults = projects.default_selection().await?;

    let section = |title: &str, rows: &[OptionRow], default_id: Option<i64>| {
        println!("  {title}:");
        for row in rows {
            let marker = if Some(row.id) == default_id { "*" } else { " " };
            println!("   {marker}{:>3}  {}", row.id, row.label);
        }
    };

    println!();
    section("Downloaders", &options.downloaders, Some(defaults.downloader_id));
    section("Text extractors", &options.text_extractors, Some(defaults.text_extractor_id));
    section("Embedders", &options.embedders, Some(defaults.embedder_id));
    section("Chunkers", &options.chunkers, None);
    section("Processors", &options.processors, Some(defaults.processor_id));
    section("LLM models", &options.llm_models, Some(defaults.llm_model_id));
    println!();
    println!("  * default");
    Ok(())
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

async fn cmd_resource_add(
    app: &App,
    project: &str,
    url: &str,
    inline: bool,
    wait: bool,
) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;

    if inline {
        let registry = Arc::new(build_registry(&app.ctx, app.reader()?));
        let runtime = Arc::new(LocalRuntime::new(registry));
        let projects = app.projects(runtime.clone());

        let Some((resource, _)) = planned(projects.add_resource(&project_id, url).await?) else {
            return Ok(());
        };
        let progress = spinner(format!("Processing {}", resource.url))?;
        runtime.wait_idle().await;
        progress.finish_and_clear();

        print_resource(&projects.get_resource(&resource.id).await?);
        return Ok(());
    }

    let projects = app.queued_projects();
    let Some((resource, pipeline_id)) = planned(projects.add_resource(&project_id, url).await?)
    else {
        return Ok(());
    };
    if !wait {
        println!("Run `readingpal worker` to process queued pipelines.");
        return Ok(());
    }

    let poll = Duration::from_millis(app.config.worker.poll_interval_ms);
    let progress = spinner(format!("{}: waiting for a worker", resource.url))?;
    let finished = loop {
        match projects.progress(&resource.id, &pipeline_id).await? {
            ResourceProgress::Settled(current) => break current,
            ResourceProgress::InFlight(current) => {
                progress.set_message(format!("{}: {}", current.url, current.status));
            }
        }
        tokio::time::sleep(poll).await;
    };
    progress.finish_and_clear();
    if !finished.status.is_terminal() {
        println!("Pipeline {pipeline_id} stopped before the resource finished.");
        println!("Inspect it with: readingpal events {project_id}");
    }
    print_resource(&finished);
    Ok(())
}

/// Print the outcome of an add; `None` when nothing was stored.
fn planned(outcome: AddResource) -> Option<(Resource, PipelineId)> {
    match outcome {
        AddResource::Planned {
            resource,
            pipeline_id,
        } => {
            println!("Added resource {} (pipeline {pipeline_id})", resource.id);
            Some((resource, pipeline_id))
        }
        AddResource::NotConfigured => {
            println!("Project is not configured; no resource was added.");
            println!("Configure it with: readingpal project configure <project>");
            None
        }
    }
}

fn print_resource(resource: &Resource) {
    println!();
    println!("  ID:      {}", resource.id);
    println!("  URL:     {}", resource.url);
    println!("  Status:  {}", resource.status);
    println!("  Updated: {}", resource.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(error) = &resource.error_msg {
        println!("  Error:   {error}");
    }
    if let Some(content) = &resource.scraped_content {
        println!();
        println!("{content}");
    }
    println!();
}

async fn cmd_resource_list(app: &App, project: &str) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let resources = app.queued_projects().list_resources(&project_id).await?;
    if resources.is_empty() {
        println!("No resources in this project.");
    }
    for resource in resources {
        println!("  {}  {:<10}  {}", resource.id, resource.status, resource.url);
    }
    Ok(())
}

async fn cmd_resource_show(app: &App, resource: &str) -> Result<()> {
    let resource_id: ResourceId = parse_id("resource", resource)?;
    let resource = app.queued_projects().get_resource(&resource_id).await?;
    print_resource(&resource);
    Ok(())
}

// ---------------------------------------------------------------------------
// Events, chats, worker, reconcile
// ---------------------------------------------------------------------------

async fn cmd_events(app: &App, project: &str, json: bool) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let events = app.queued_projects().events(&project_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }
    for event in events {
        println!("{}", event.human_readable());
    }
    Ok(())
}

async fn cmd_chat_create(app: &App, project: &str, name: &str) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    match ChatManager::new(app.ctx.clone()).add_chat(&project_id, name).await? {
        Some(chat) => println!("Created chat {} ({})", chat.name, chat.id),
        None => println!("Project is not configured; no chat was created."),
    }
    Ok(())
}

async fn cmd_chat_list(app: &App, project: &str) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let chats = ChatManager::new(app.ctx.clone()).list_chats(&project_id).await?;
    if chats.is_empty() {
        println!("No chats in this project.");
    }
    for chat in chats {
        println!("  {}  {}", chat.id, chat.name);
    }
    Ok(())
}

async fn cmd_worker(app: &App, once: bool) -> Result<()> {
    let registry = Arc::new(build_registry(&app.ctx, app.reader()?));
    let worker = Worker::new(
        Arc::clone(&app.storage),
        registry,
        WorkerOptions::from(&app.config.worker),
    );

    if once {
        let finished = worker.run_once().await?;
        println!("Finished {finished} pipeline(s).");
        return Ok(());
    }

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested, finishing current batch");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    worker.run().await;
    Ok(())
}

async fn cmd_reconcile(app: &App, project: &str) -> Result<()> {
    let project_id: ProjectId = parse_id("project", project)?;
    let report = reconcile_project(&app.ctx, &project_id).await?;

    println!("Scanned {} resource(s).", report.resources_scanned);
    if report.is_clean() {
        println!("Event log is consistent.");
    }
    for (entity_id, event_type) in &report.events_appended {
        println!("  restored {event_type}: {entity_id}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => cmd_config_init().await,
        ConfigAction::Show => cmd_config_show().await,
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
