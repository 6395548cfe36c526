//! Hermetic orchestrator tests against a mock HTTP server instead of live
//! network calls — `render`'s shared cache is a process-wide singleton, so
//! every test below uses a distinct URL path to avoid cross-test cache hits.

use agentweb::{render, RenderOptions};
use std::sync::Once;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT_ENV: Once = Once::new();

fn init_shared_cache_env() {
    INIT_ENV.call_once(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("orchestrator-test-cache.db");
        // SAFETY: runs once, before any test reads the shared cache config.
        unsafe {
            std::env::set_var("AGENTWEB_CACHE_DB_PATH", &db_path);
        }
        std::mem::forget(dir);
    });
}

const STATIC_PAGE: &str = r#"<html><head><title>Static Page</title></head>
<body><main><h1>Welcome</h1><p>This is a perfectly ordinary server-rendered page with enough prose in it to score as a real paragraph chunk.</p></main></body></html>"#;

#[tokio::test]
async fn repeated_render_is_served_from_cache_on_second_call() {
    init_shared_cache_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repeat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATIC_PAGE))
        .expect(1..=2)
        .mount(&server)
        .await;

    let url = format!("{}/repeat", server.uri());
    let opts = RenderOptions::default();

    let first = render(&url, &opts).await;
    assert!(first.error.is_none());
    assert!(!first.cached);

    let second = render(&url, &opts).await;
    assert!(second.cached);
    assert_eq!(second.summary, first.summary);
}

#[tokio::test]
async fn no_cache_option_bypasses_the_cache_entirely() {
    init_shared_cache_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/nocache"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATIC_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/nocache", server.uri());
    let opts = RenderOptions {
        no_cache: true,
        ..RenderOptions::default()
    };

    let first = render(&url, &opts).await;
    assert!(!first.cached);
    let second = render(&url, &opts).await;
    assert!(!second.cached);
}

#[tokio::test]
async fn invalidate_cache_reports_removed_entry_count() {
    init_shared_cache_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/invalidate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATIC_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/invalidate", server.uri());
    let result = render(&url, &RenderOptions::default()).await;
    assert!(result.error.is_none());

    let removed = agentweb::invalidate_cache(&url).expect("invalidate_cache failed");
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn non_2xx_status_surfaces_as_an_error_result() {
    init_shared_cache_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let result = render(&url, &RenderOptions::default()).await;
    assert_eq!(result.backend, "error");
    assert!(result.error.is_some());
}

#[tokio::test]
async fn lite_backend_is_chosen_for_a_static_page() {
    init_shared_cache_env();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/static"))
        .respond_with(ResponseTemplate::new(200).set_body_string(STATIC_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/static", server.uri());
    let result = render(&url, &RenderOptions::default()).await;
    assert_eq!(result.backend, "lite");
    assert!(result.detection.is_some());
    assert!(!result.detection.unwrap().is_spa);
}
