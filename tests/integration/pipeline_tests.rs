//! End-to-end runs of the collection job through the scheduler

use crate::common::{chat_response, create_test_config, mount_permissive_robots, TRENDING_PAGE};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use trend_relay::app::App;
use trend_relay::config::Config;
use trend_relay::storage::{shared, SqliteStorage};
use trend_relay::{TaskStatus, TaskType};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_trending(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(TRENDING_PAGE)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn create_app(config: &Config, dir: &Path) -> App {
    let storage = shared(SqliteStorage::new(&dir.join("relay.db")).unwrap());
    App::with_storage(config, storage, CancellationToken::new()).unwrap()
}

fn snapshots(dir: &Path) -> Vec<serde_json::Value> {
    let out = dir.join("out");
    if !out.exists() {
        return Vec::new();
    }
    std::fs::read_dir(out)
        .unwrap()
        .map(|entry| {
            let bytes = std::fs::read(entry.unwrap().path()).unwrap();
            serde_json::from_slice(&bytes).unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_daily_run_collects_filters_and_delivers() {
    let site = MockServer::start().await;
    let providers = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_permissive_robots(&site).await;
    mount_trending(&site, "/trending/daily").await;

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(chat_response("Generated summary"))
        .expect(2)
        .mount(&providers)
        .await;

    let config = create_test_config(&site.uri(), &providers.uri(), dir.path(), "");
    let app = create_app(&config, dir.path());

    let outcome = app.scheduler().run_now(TaskType::Daily).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.items_found, 3);
    // tiny/toy is below min-total-stars
    assert_eq!(outcome.items_kept, 2);
    assert_eq!(outcome.attempts, 1);

    let delivered = snapshots(dir.path());
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["task_type"], "daily");
    assert_eq!(delivered[0]["listings"][0]["name"], "acme/rocket");
    assert_eq!(delivered[0]["listings"][0]["summary"], "Generated summary");
    assert_eq!(delivered[0]["listings"][0]["provider_id"], "primary");

    // Same listings again are de-duplicated
    let again = app.scheduler().run_now(TaskType::Daily).await.unwrap();
    assert_eq!(again.status, TaskStatus::Success);
    assert_eq!(again.items_found, 3);
    assert_eq!(again.items_kept, 0);

    let history = app.history(10).unwrap();
    assert_eq!(history.len(), 2);

    // Manual runs leave the calendar untouched
    let entries = app.storage().lock().unwrap().load_schedule().unwrap();
    assert!(entries.iter().all(|e| e.last_run.is_none()));
}

#[tokio::test]
async fn test_keyword_subscription_narrows_delivery() {
    let site = MockServer::start().await;
    let providers = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_permissive_robots(&site).await;
    mount_trending(&site, "/trending/daily").await;

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(chat_response("Generated summary"))
        .expect(1)
        .mount(&providers)
        .await;

    let extra = "[subscription]\nkeywords = [\"HANDY\"]\nmatch-mode = \"exact\"\n";
    let config = create_test_config(&site.uri(), &providers.uri(), dir.path(), extra);
    let app = create_app(&config, dir.path());

    let outcome = app.run_once(TaskType::Daily).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.items_found, 3);
    assert_eq!(outcome.items_kept, 1);

    let delivered = snapshots(dir.path());
    let listings = delivered[0]["listings"].as_array().unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0]["name"], "beta/tool");
}

#[tokio::test]
async fn test_enrichment_failure_yields_partial() {
    let site = MockServer::start().await;
    let providers = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_permissive_robots(&site).await;
    mount_trending(&site, "/trending/weekly").await;

    // The primary fails for one listing only
    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "messages": [{ "role": "user", "content": "Describe beta/tool" }]
        })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&providers)
        .await;

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(chat_response("Primary summary"))
        .mount(&providers)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&providers)
        .await;

    let mut config = create_test_config(&site.uri(), &providers.uri(), dir.path(), "");
    config.enrichment.prompt_template = "Describe {name}".to_string();
    let app = create_app(&config, dir.path());

    let outcome = app.scheduler().run_now(TaskType::Weekly).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Partial);
    assert_eq!(outcome.items_kept, 2);
    assert!(outcome.error_summary.unwrap().starts_with("1 listings"));

    let delivered = snapshots(dir.path());
    let listings = delivered[0]["listings"].as_array().unwrap();
    let tool = listings.iter().find(|l| l["name"] == "beta/tool").unwrap();
    assert_eq!(tool["summary"], "A handy tool");
    assert!(tool["provider_id"].is_null());
}

#[tokio::test]
async fn test_empty_page_is_a_quiet_success() {
    let site = MockServer::start().await;
    let providers = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_permissive_robots(&site).await;
    Mock::given(method("GET"))
        .and(path("/trending/monthly"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>maintenance</body></html>"))
        .expect(1)
        .mount(&site)
        .await;

    Mock::given(method("POST"))
        .and(path("/alert"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&providers)
        .await;

    let extra = format!("[alerting]\nwebhook-url = \"{}/alert\"\n", providers.uri());
    let config = create_test_config(&site.uri(), &providers.uri(), dir.path(), &extra);
    let app = create_app(&config, dir.path());

    let outcome = app.run_once(TaskType::Monthly).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.items_found, 0);
    assert_eq!(outcome.items_kept, 0);
    assert!(outcome.error_summary.is_none());
    assert!(snapshots(dir.path()).is_empty());
}

#[tokio::test]
async fn test_failing_page_retries_and_alerts_once() {
    let site = MockServer::start().await;
    let providers = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_permissive_robots(&site).await;
    Mock::given(method("GET"))
        .and(path("/trending/monthly"))
        .respond_with(ResponseTemplate::new(404))
        // scheduler max-retries = 1
        .expect(2)
        .mount(&site)
        .await;

    Mock::given(method("POST"))
        .and(path("/alert"))
        .and(body_partial_json(serde_json::json!({ "level": "error", "source": "TestRelay" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&providers)
        .await;

    let extra = format!("[alerting]\nwebhook-url = \"{}/alert\"\n", providers.uri());
    let config = create_test_config(&site.uri(), &providers.uri(), dir.path(), &extra);
    let app = create_app(&config, dir.path());

    let outcome = app.run_once(TaskType::Monthly).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.error_summary.unwrap().contains("HTTP 404"));
    assert!(snapshots(dir.path()).is_empty());

    let history = app.history(5).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].status.is_failure());
}

#[tokio::test]
async fn test_robots_denial_fails_the_run() {
    let site = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: TestRelay\nDisallow: /trending"))
        .mount(&site)
        .await;

    Mock::given(method("GET"))
        .and(path("/trending/daily"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TRENDING_PAGE))
        .expect(0)
        .mount(&site)
        .await;

    let config = create_test_config(&site.uri(), &site.uri(), dir.path(), "");
    let app = create_app(&config, dir.path());

    let outcome = app.run_once(TaskType::Daily).await.unwrap();
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert!(outcome.error_summary.unwrap().contains("robots.txt"));
}
