//! End-to-end pipeline runs against a mock reader API.

use std::sync::Arc;

use readingpal_core::{
    AddResource, CoreContext, ExtractTextHandler, PipelineEvent, Planner, ProjectManager,
    build_chain, build_registry,
};
use readingpal_reader::{ReaderClient, ReaderOptions};
use readingpal_runtime::{JobHandler, JobOutcome, JobParams, JobRuntime, LocalRuntime};
use readingpal_shared::{EventType, Project, ProjectId, Resource, ResourceId, ResourceStatus};
use readingpal_storage::Storage;
use uuid::Uuid;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    ctx: CoreContext,
    runtime: Arc<LocalRuntime>,
    projects: ProjectManager,
    reader: Arc<ReaderClient>,
}

async fn harness(server: &MockServer) -> Harness {
    harness_with_key(server, Some("test-key")).await
}

async fn harness_with_key(server: &MockServer, api_key: Option<&str>) -> Harness {
    let tmp = std::env::temp_dir().join(format!("rp_scenario_{}.db", Uuid::now_v7()));
    let storage = Storage::open(&tmp).await.expect("open test db");
    let ctx = CoreContext::new(Arc::new(storage));

    let reader = Arc::new(
        ReaderClient::new(ReaderOptions {
            base_url: server.uri(),
            api_key: api_key.map(String::from),
            api_key_env: "JINA_AI_API_KEY".into(),
            timeout_secs: 5,
        })
        .expect("reader client"),
    );
    let registry = Arc::new(build_registry(&ctx, Arc::clone(&reader)));
    let runtime = Arc::new(LocalRuntime::new(registry));
    let projects = ProjectManager::new(ctx.clone(), Planner::new(runtime.clone()));

    Harness {
        ctx,
        runtime,
        projects,
        reader,
    }
}

async fn configured_project(h: &Harness) -> Project {
    let project = h.projects.create_project().await.unwrap();
    let selection = h.projects.default_selection().await.unwrap();
    h.projects
        .configure_project(&project.id, &selection)
        .await
        .unwrap();
    project
}

async fn add(h: &Harness, project_id: &ProjectId, url: &str) -> Resource {
    match h.projects.add_resource(project_id, url).await.unwrap() {
        AddResource::Planned { resource, .. } => resource,
        AddResource::NotConfigured => panic!("project should be configured"),
    }
}

async fn event_kinds(h: &Harness, entity_id: &str) -> Vec<EventType> {
    h.ctx
        .events
        .for_entity(entity_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn successful_resource_reaches_processed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let project = configured_project(&h).await;
    let resource = add(&h, &project.id, "https://example.com/a").await;
    assert_eq!(resource.status, ResourceStatus::New);

    let reports = h.runtime.wait_idle().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_complete());

    let stored = h.projects.get_resource(&resource.id).await.unwrap();
    assert_eq!(stored.status, ResourceStatus::Processed);
    assert_eq!(stored.scraped_content.as_deref(), Some("hello world"));
    assert!(stored.error_msg.is_none());

    assert_eq!(
        event_kinds(&h, &resource.id.to_string()).await,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::DownloadedAndTextExtracted,
            EventType::ResourceProcessed,
        ]
    );
}

#[tokio::test]
async fn reader_failure_moves_resource_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let project = configured_project(&h).await;
    let resource = add(&h, &project.id, "https://example.com/a").await;

    let reports = h.runtime.wait_idle().await;
    assert!(!reports[0].is_complete());
    assert_eq!(reports[0].halted_at, Some(0));

    let stored = h.projects.get_resource(&resource.id).await.unwrap();
    assert_eq!(stored.status, ResourceStatus::Error);
    assert!(stored.scraped_content.is_none());
    let msg = stored.error_msg.unwrap();
    assert!(msg.contains("500"), "{msg}");
    assert!(msg.contains("server error"), "{msg}");

    let kinds = event_kinds(&h, &resource.id.to_string()).await;
    assert_eq!(
        kinds,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::ProcessingError,
        ]
    );
}

#[tokio::test]
async fn missing_resource_logs_one_processing_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let project = configured_project(&h).await;
    let ghost = ResourceId::new();

    let handler = ExtractTextHandler::new(h.ctx.clone(), Arc::clone(&h.reader));
    let outcome = handler
        .run(JobParams {
            project_id: project.id.clone(),
            resource_id: ghost.clone(),
        })
        .await;
    assert!(matches!(outcome, JobOutcome::Failed(_)));

    assert_eq!(
        event_kinds(&h, &ghost.to_string()).await,
        vec![EventType::ProcessingError]
    );
    assert!(h.ctx.storage.get_resource(&ghost).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_resources_progress_independently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("/good$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("good text"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("/bad$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let project = configured_project(&h).await;

    let (good, bad) = tokio::join!(
        add(&h, &project.id, "https://example.com/good"),
        add(&h, &project.id, "https://example.com/bad"),
    );
    let reports = h.runtime.wait_idle().await;
    assert_eq!(reports.len(), 2);

    let good = h.projects.get_resource(&good.id).await.unwrap();
    assert_eq!(good.status, ResourceStatus::Processed);
    assert_eq!(good.scraped_content.as_deref(), Some("good text"));

    let bad = h.projects.get_resource(&bad.id).await.unwrap();
    assert_eq!(bad.status, ResourceStatus::Error);
    assert!(bad.error_msg.unwrap().contains("unavailable"));

    assert_eq!(
        event_kinds(&h, &good.id.to_string()).await,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::DownloadedAndTextExtracted,
            EventType::ResourceProcessed,
        ]
    );
    assert_eq!(
        event_kinds(&h, &bad.id.to_string()).await,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::ProcessingError,
        ]
    );

    let resources = h.projects.list_resources(&project.id).await.unwrap();
    assert_eq!(resources.len(), 2);
}

#[tokio::test]
async fn unconfigured_project_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let project = h.projects.create_project().await.unwrap();

    let outcome = h
        .projects
        .add_resource(&project.id, "https://example.com/a")
        .await
        .unwrap();
    assert!(matches!(outcome, AddResource::NotConfigured));
    assert!(h.runtime.wait_idle().await.is_empty());
    assert!(h.projects.list_resources(&project.id).await.unwrap().is_empty());

    let kinds: Vec<EventType> = h
        .projects
        .events(&project.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(kinds, vec![EventType::ProjectCreated]);
}

#[tokio::test]
async fn missing_api_key_moves_resource_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness_with_key(&server, None).await;
    let project = configured_project(&h).await;
    let resource = add(&h, &project.id, "https://example.com/a").await;
    h.runtime.wait_idle().await;

    let stored = h.projects.get_resource(&resource.id).await.unwrap();
    assert_eq!(stored.status, ResourceStatus::Error);
    assert!(stored.error_msg.unwrap().contains("JINA_AI_API_KEY"));
    assert_eq!(
        event_kinds(&h, &resource.id.to_string()).await,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::ProcessingError,
        ]
    );
}

#[tokio::test]
async fn configuration_absent_at_run_time_moves_resource_to_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server).await;
    let configured = configured_project(&h).await;
    let configuration = h
        .ctx
        .resolver
        .resolve(&configured.id)
        .await
        .unwrap()
        .expect("configured project resolves");

    // The chain is planned from a configuration this project no longer has.
    let project = h.projects.create_project().await.unwrap();
    let resource = Resource::new(ResourceId::new(), project.id.clone(), "https://example.com/a");
    h.ctx.storage.insert_resource(&resource).await.unwrap();
    let entity = resource.id.to_string();
    h.ctx
        .events
        .record(&project.id, EventType::ResourceAdded, &entity)
        .await
        .unwrap();
    let chain = build_chain(
        PipelineEvent::ResourceCreated,
        &configuration,
        &project.id,
        &resource.id,
    )
    .unwrap();
    h.runtime.submit(chain).await.unwrap();
    h.runtime.wait_idle().await;

    let stored = h.projects.get_resource(&resource.id).await.unwrap();
    assert_eq!(stored.status, ResourceStatus::Error);
    assert!(
        stored
            .error_msg
            .unwrap()
            .contains("has no pipeline configuration")
    );
    assert_eq!(
        event_kinds(&h, &entity).await,
        vec![
            EventType::ResourceAdded,
            EventType::ProcessingStarted,
            EventType::ProcessingError,
        ]
    );
}
