//! HTTP connectors and the full pass against mocked help-center and
//! vector-store APIs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use corpus_sync::config::{HelpCenterConfig, RemoteConfig};
use corpus_sync::connector_help_center::HelpCenterSource;
use corpus_sync::executor::RetryPolicy;
use corpus_sync::ingest::{Orchestrator, PassOptions};
use corpus_sync::sqlite_store::SqliteFingerprintStore;
use corpus_sync::vector_store::VectorStoreRemote;
use corpus_sync::{db, migrate};
use corpus_sync_core::error::{RemoteError, SourceError};
use corpus_sync_core::models::{ContentNode, NodeKind};
use corpus_sync_core::remote::RemoteStore;
use corpus_sync_core::source::ContentSource;
use corpus_sync_core::store::FingerprintStore;

const HC: &str = "/api/v2/help_center/en-us";

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        attempt_timeout: Duration::from_secs(5),
    }
}

fn hc_config(server: &MockServer, include_drafts: bool) -> HelpCenterConfig {
    HelpCenterConfig {
        base_url: format!("{}/api/v2/help_center", server.uri()),
        locale: "en-us".into(),
        per_page: 100,
        timeout_secs: 5,
        include_drafts,
        fetch_concurrency: 4,
    }
}

async fn mount_json(server: &MockServer, p: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Two category pages, one nested section, one draft article.
async fn mount_help_center(server: &MockServer) {
    mount_json(
        server,
        &format!("{}/categories.json", HC),
        json!({
            "categories": [{"id": 1, "name": "General", "description": "Basics"}],
            "page": 1,
            "next_page": format!("{}{}/categories.json?page=2&per_page=100", server.uri(), HC),
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/categories.json", HC)))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "categories": [{"id": 2, "name": "Hardware", "description": ""}],
            "page": 2,
            "next_page": null,
        })))
        .with_priority(1)
        .mount(server)
        .await;

    mount_json(
        server,
        &format!("{}/categories/1/sections.json", HC),
        json!({
            "sections": [
                {"id": 10, "category_id": 1, "name": "Setup", "description": "", "parent_section_id": null},
                {"id": 11, "category_id": 1, "name": "Advanced setup", "description": "", "parent_section_id": 10},
            ],
            "next_page": null,
        }),
    )
    .await;
    mount_json(
        server,
        &format!("{}/categories/2/sections.json", HC),
        json!({"sections": [], "next_page": null}),
    )
    .await;
    mount_json(
        server,
        &format!("{}/sections/10/articles.json", HC),
        json!({
            "articles": [
                {"id": 100, "section_id": 10, "title": "Install", "body": "<p>Run it.</p>", "draft": false},
                {"id": 101, "section_id": 10, "title": "Unreleased", "body": "<p>Soon.</p>", "draft": true},
            ],
            "next_page": null,
        }),
    )
    .await;
    mount_json(
        server,
        &format!("{}/sections/11/articles.json", HC),
        json!({
            "articles": [{"id": 110, "section_id": 11, "title": "Proxy", "body": "<p>Set it.</p>", "draft": false}],
            "next_page": null,
        }),
    )
    .await;
}

fn ids(nodes: &[ContentNode]) -> Vec<&str> {
    nodes.iter().map(|n| n.id.as_str()).collect()
}

// --- Help center ---

#[tokio::test]
async fn help_center_builds_tree_across_pages() {
    let server = MockServer::start().await;
    mount_help_center(&server).await;

    let source = HelpCenterSource::new(hc_config(&server, false), fast_retry(2)).unwrap();
    let nodes = source.fetch_tree().await.unwrap();

    assert_eq!(
        ids(&nodes),
        vec![
            "category:1",
            "category:2",
            "section:10",
            "section:11",
            "article:100",
            "article:110"
        ]
    );
    let nested = nodes.iter().find(|n| n.id == "section:11").unwrap();
    assert_eq!(nested.parent_id.as_deref(), Some("section:10"));
    let article = nodes.iter().find(|n| n.id == "article:100").unwrap();
    assert_eq!(article.kind, NodeKind::Article);
    assert_eq!(article.parent_id.as_deref(), Some("section:10"));
    assert_eq!(article.body, "<p>Run it.</p>");
}

#[tokio::test(flavor = "multi_thread")]
async fn help_center_fetches_sections_concurrently_in_order() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        &format!("{}/categories.json", HC),
        json!({"categories": [{"id": 1, "name": "General"}], "next_page": null}),
    )
    .await;
    let section_ids = [10u64, 11, 12, 13];
    let sections: Vec<serde_json::Value> = section_ids
        .iter()
        .map(|id| json!({"id": id, "category_id": 1, "name": format!("S{}", id)}))
        .collect();
    mount_json(
        &server,
        &format!("{}/categories/1/sections.json", HC),
        json!({"sections": sections, "next_page": null}),
    )
    .await;
    for id in section_ids {
        // The first listing is the slowest, so completion order differs
        // from section order.
        let delay = if id == 10 { 600 } else { 300 };
        Mock::given(method("GET"))
            .and(path(format!("{}/sections/{}/articles.json", HC, id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "articles": [{"id": id * 10, "section_id": id, "title": "A", "body": "b"}],
                        "next_page": null,
                    }))
                    .set_delay(Duration::from_millis(delay)),
            )
            .mount(&server)
            .await;
    }

    let source = HelpCenterSource::new(hc_config(&server, false), fast_retry(1)).unwrap();
    let started = std::time::Instant::now();
    let nodes = source.fetch_tree().await.unwrap();
    let elapsed = started.elapsed();

    let articles: Vec<&str> = ids(&nodes)
        .into_iter()
        .filter(|id| id.starts_with("article:"))
        .collect();
    assert_eq!(
        articles,
        vec!["article:100", "article:110", "article:120", "article:130"]
    );
    // One at a time would take at least 1.5s.
    assert!(elapsed < Duration::from_millis(1300), "took {:?}", elapsed);
}

#[tokio::test]
async fn help_center_includes_drafts_when_configured() {
    let server = MockServer::start().await;
    mount_help_center(&server).await;

    let source = HelpCenterSource::new(hc_config(&server, true), fast_retry(2)).unwrap();
    let nodes = source.fetch_tree().await.unwrap();
    assert!(ids(&nodes).contains(&"article:101"));
}

#[tokio::test]
async fn help_center_retries_transient_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/categories.json", HC)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_json(
        &server,
        &format!("{}/categories.json", HC),
        json!({"categories": [], "next_page": null}),
    )
    .await;

    let source = HelpCenterSource::new(hc_config(&server, false), fast_retry(3)).unwrap();
    assert!(source.fetch_tree().await.unwrap().is_empty());
}

#[tokio::test]
async fn help_center_failure_fails_whole_fetch() {
    let server = MockServer::start().await;
    mount_help_center(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sections/11/articles.json", HC)))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;

    let source = HelpCenterSource::new(hc_config(&server, false), fast_retry(2)).unwrap();
    let err = source.fetch_tree().await.unwrap_err();
    assert!(matches!(err, SourceError::Unavailable(_)));
}

#[tokio::test]
async fn help_center_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/categories.json", HC)))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let source = HelpCenterSource::new(hc_config(&server, false), fast_retry(5)).unwrap();
    assert!(source.fetch_tree().await.is_err());
}

// --- Vector store ---

fn remote_for(server: &MockServer) -> VectorStoreRemote {
    VectorStoreRemote::with_store(&server.uri(), "test-key", "vs_1").unwrap()
}

fn article() -> ContentNode {
    ContentNode::new("article:1", Some("section:1"), NodeKind::Article, "Install Guide", "Run it.")
}

#[tokio::test]
async fn vector_store_create_uploads_and_attaches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_string_contains("install-guide.md"))
        .and(body_string_contains("# Install Guide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores/vs_1/files"))
        .and(body_string_contains("file-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = remote_for(&server).create(&article()).await.unwrap();
    assert_eq!(id, "file-abc");
}

#[tokio::test]
async fn vector_store_attach_failure_cleans_up_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores/vs_1/files"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad file"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/file-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let err = remote_for(&server).create(&article()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Permanent(_)));
}

#[tokio::test]
async fn vector_store_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = remote_for(&server).create(&article()).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn vector_store_delete_treats_404_as_done() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/vector_stores/vs_1/files/file-gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/file-gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server).delete("file-gone").await.unwrap();
}

#[tokio::test]
async fn vector_store_delete_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/vector_stores/vs_1/files/file-1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = remote_for(&server).delete("file-1").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn vector_store_update_replaces_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-new"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores/vs_1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-new"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/vector_stores/vs_1/files/file-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/file-old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .expect(1)
        .mount(&server)
        .await;

    let new_id = remote_for(&server).update("file-old", &article()).await.unwrap();
    assert_eq!(new_id.as_deref(), Some("file-new"));
}

#[tokio::test]
async fn vector_store_list_follows_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vector_stores/vs_1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "f1"}, {"id": "f2"}],
            "has_more": true,
            "last_id": "f2",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vector_stores/vs_1/files"))
        .and(query_param("after", "f2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "f3"}],
            "has_more": false,
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    let ids = remote_for(&server).list().await.unwrap();
    assert_eq!(ids, vec!["f1", "f2", "f3"]);
}

fn remote_config(server: &MockServer, key_env: &str, name: &str) -> RemoteConfig {
    RemoteConfig {
        base_url: server.uri(),
        vector_store_id: None,
        vector_store_name: Some(name.into()),
        api_key_env: key_env.into(),
    }
}

#[tokio::test]
async fn vector_store_connect_finds_store_by_name() {
    std::env::set_var("CSYNC_TEST_KEY_FIND", "k");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vector_stores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "vs_9", "name": "Other"}, {"id": "vs_7", "name": "Help Center"}],
            "has_more": false,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vs_new"})))
        .expect(0)
        .mount(&server)
        .await;

    let config = remote_config(&server, "CSYNC_TEST_KEY_FIND", "Help Center");
    let remote = VectorStoreRemote::connect(&config).await.unwrap();
    assert_eq!(remote.vector_store_id(), "vs_7");
}

#[tokio::test]
async fn vector_store_connect_creates_missing_store() {
    std::env::set_var("CSYNC_TEST_KEY_CREATE", "k");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vector_stores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "vs_9", "name": "Other"}],
            "has_more": false,
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores"))
        .and(body_string_contains("Help Center"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vs_new"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = remote_config(&server, "CSYNC_TEST_KEY_CREATE", "Help Center");
    let remote = VectorStoreRemote::connect(&config).await.unwrap();
    assert_eq!(remote.vector_store_id(), "vs_new");
}

#[tokio::test]
async fn vector_store_connect_requires_api_key() {
    let server = MockServer::start().await;
    let result =
        VectorStoreRemote::connect(&remote_config(&server, "CSYNC_TEST_KEY_NEVER_SET", "x")).await;
    assert!(result.is_err());
}

// --- Full pass ---

/// Hands out `file-1`, `file-2`, … for every upload.
fn sequential_file_ids() -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    let counter = Arc::new(AtomicUsize::new(0));
    move |_req: &Request| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!({"id": format!("file-{}", n)}))
    }
}

#[tokio::test]
async fn full_pass_against_mocked_services() {
    let hc = MockServer::start().await;
    mount_help_center(&hc).await;

    let vs = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(sequential_file_ids())
        .expect(6)
        .mount(&vs)
        .await;
    Mock::given(method("POST"))
        .and(path("/vector_stores/vs_1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in_progress"})))
        .expect(6)
        .mount(&vs)
        .await;

    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("fp.sqlite")).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    let store = Arc::new(SqliteFingerprintStore::new(pool));

    let orchestrator = Orchestrator::new(
        Arc::new(HelpCenterSource::new(hc_config(&hc, false), fast_retry(2)).unwrap()),
        store.clone(),
        Arc::new(remote_for(&vs)),
        PassOptions {
            retry: fast_retry(2),
            concurrency: 2,
            ..PassOptions::default()
        },
    );

    let first = orchestrator.run_pass().await.unwrap();
    assert_eq!(first.created, 6);
    assert!(first.is_clean());

    let stored = store.get_all().await.unwrap();
    assert_eq!(stored.len(), 6);
    assert!(stored.values().all(|fp| fp.remote_id.starts_with("file-")));
    assert_eq!(stored["section:11"].parent_id.as_deref(), Some("section:10"));

    let second = orchestrator.run_pass().await.unwrap();
    assert_eq!(second.unchanged, 6);
    assert_eq!(second.created + second.updated + second.deleted, 0);
}
