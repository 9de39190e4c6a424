use std::sync::Arc;

use pullcache_service::caching::{Project, VersionedPullCache, WorkspaceLoadState};
use pullcache_service::types::ResourceId;
use pullcache_test::setup;

use crate::utils::{Client, Diagnostic, DocumentDiagnostics, Solution, WorkspaceDiagnostics};

const PROGRAM: &str = "file:///Program.cs";
const HELPER: &str = "file:///Helper.cs";

fn solution() -> Solution {
    Solution::new()
        .with_document(PROGRAM, "class Program {\n    int x = error;\n}\n")
        .with_document(HELPER, "static class Helper {}\n")
}

fn project() -> Project {
    Project::fully_loaded("MyProject".into(), "C#")
}

#[tokio::test]
async fn test_document_diagnostics_called_twice() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let mut client = Client::new();
    let (project, resource) = (project(), ResourceId::document(PROGRAM));
    let solution = solution();

    let diagnostics = client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert_eq!(
        diagnostics,
        Some(vec![Diagnostic {
            uri: PROGRAM.into(),
            line: 1,
            message: "int x = error;".into(),
        }])
    );
    assert_eq!(client.result_id(&resource), Some("DocumentDiagnostics:1"));

    let diagnostics = client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(cache.request().computations(), 1);
}

#[tokio::test]
async fn test_document_diagnostics_after_unrelated_changes() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let mut client = Client::new();
    let (project, resource) = (project(), ResourceId::document(PROGRAM));
    let solution = solution();

    assert!(client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await
        .is_some());

    // editing another document bumps the generation of the whole solution
    let edited = solution.with_document(HELPER, "static class Helper { }\n");
    let diagnostics = client
        .pull(&cache, &resource, &project, &edited.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);

    let reloaded = edited.fork();
    let diagnostics = client
        .pull(&cache, &resource, &project, &reloaded.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);

    assert_eq!(cache.request().computations(), 1);
    assert_eq!(client.result_id(&resource), Some("DocumentDiagnostics:1"));
}

#[tokio::test]
async fn test_document_diagnostics_after_whitespace_edit() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let mut client = Client::new();
    let (project, resource) = (project(), ResourceId::document(PROGRAM));
    let solution = solution();

    client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;

    let edited = solution.with_document(PROGRAM, "class Program {\n    int x = error; \n}\n");
    let diagnostics = client
        .pull(&cache, &resource, &project, &edited.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(cache.request().computations(), 2);
    assert_eq!(client.result_id(&resource), Some("DocumentDiagnostics:1"));

    // the new text was recorded, so asking again needs no computation
    let diagnostics = client
        .pull(&cache, &resource, &project, &edited.fork().document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(cache.request().computations(), 2);
}

#[tokio::test]
async fn test_document_diagnostics_after_fix() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let mut client = Client::new();
    let (project, resource) = (project(), ResourceId::document(PROGRAM));
    let solution = solution();

    client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;

    let fixed = solution.with_document(PROGRAM, "class Program {\n    int x = 42;\n}\n");
    let diagnostics = client
        .pull(&cache, &resource, &project, &fixed.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, Some(vec![]));
    assert_eq!(client.result_id(&resource), Some("DocumentDiagnostics:2"));

    // a second client that never saw the first result gets its own
    let mut other = Client::new();
    let diagnostics = other
        .pull(&cache, &resource, &project, &fixed.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, Some(vec![]));
    assert_eq!(other.result_id(&resource), Some("DocumentDiagnostics:3"));
}

#[tokio::test]
async fn test_document_diagnostics_while_loading() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let load_state = WorkspaceLoadState::loading();
    let project = Project::new("MyProject".into(), "C#", Arc::new(load_state.clone()));
    let resource = ResourceId::document(PROGRAM);
    let mut client = Client::new();
    let solution = solution();

    client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    let diagnostics = client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(cache.request().computations(), 2);

    load_state.set_fully_loaded(true);
    let diagnostics = client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(cache.request().computations(), 2);
}

#[tokio::test]
async fn test_workspace_diagnostics() {
    setup();

    let documents = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let workspace =
        VersionedPullCache::new("WorkspaceDiagnostics", WorkspaceDiagnostics::default());
    let mut client = Client::new();
    let project = project();
    let document = ResourceId::document(PROGRAM);
    let everything = ResourceId::project("MyProject");
    let solution = solution();

    client
        .pull(&documents, &document, &project, &solution.document(PROGRAM))
        .await;
    let diagnostics = client
        .pull(&workspace, &everything, &project, &solution)
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(client.result_id(&document), Some("DocumentDiagnostics:1"));
    assert_eq!(client.result_id(&everything), Some("WorkspaceDiagnostics:1"));

    let broken = solution.with_document(HELPER, "static class Helper { error }\n");
    let diagnostics = client
        .pull(&workspace, &everything, &project, &broken)
        .await
        .unwrap();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(client.result_id(&everything), Some("WorkspaceDiagnostics:2"));

    // the document itself did not change
    let diagnostics = client
        .pull(&documents, &document, &project, &broken.document(PROGRAM))
        .await;
    assert_eq!(diagnostics, None);
    assert_eq!(documents.request().computations(), 1);
    assert_eq!(workspace.request().computations(), 2);
}

#[tokio::test]
async fn test_closed_workspace() {
    setup();

    let cache = VersionedPullCache::new("DocumentDiagnostics", DocumentDiagnostics::default());
    let mut client = Client::new();
    let (project, resource) = (project(), ResourceId::document(PROGRAM));
    let solution = solution();

    client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert_eq!(cache.entry_count(), 1);

    cache.remove_workspace(project.workspace());
    assert_eq!(cache.entry_count(), 0);

    // reopening reports everything again
    let diagnostics = client
        .pull(&cache, &resource, &project, &solution.document(PROGRAM))
        .await;
    assert!(diagnostics.is_some());
    assert_eq!(client.result_id(&resource), Some("DocumentDiagnostics:2"));
}
