//! Fetcher behaviour against a live mock server

use crate::common::{create_test_config, mount_permissive_robots};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trend_relay::config::Config;
use trend_relay::crawler::{build_http_client, FetchTarget, Fetcher, GovernorRegistry};
use trend_relay::robots::RobotsGate;
use trend_relay::state::RateSettings;
use trend_relay::FetchError;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_fetcher(config: &Config) -> Fetcher {
    let client = build_http_client(&config.user_agent, false).unwrap();
    let robots = Arc::new(RobotsGate::new(
        client.clone(),
        &config.user_agent.crawler_name,
        &config.robots,
    ));
    let governors = Arc::new(GovernorRegistry::new(RateSettings::from(&config.rate_limit)));
    Fetcher::new(client, robots, governors, &config.fetcher, CancellationToken::new())
}

fn target(server: &MockServer, route: &str) -> FetchTarget {
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    FetchTarget::new(url, "collection", Duration::from_secs(5))
}

#[tokio::test]
async fn test_robots_denial_makes_no_request() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = create_fetcher(&config);

    let result = fetcher.fetch(&target(&server, "/private/page")).await;
    assert!(matches!(result, Err(FetchError::RobotsDisallowed { .. })));
}

#[tokio::test]
async fn test_robots_server_error_is_permissive() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = create_fetcher(&config);

    assert_eq!(fetcher.fetch(&target(&server, "/page")).await.unwrap(), "hello");
}

#[tokio::test]
async fn test_rate_limited_then_success() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_permissive_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("after wait"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = create_fetcher(&config);

    assert_eq!(
        fetcher.fetch(&target(&server, "/page")).await.unwrap(),
        "after wait"
    );
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_permissive_robots(&server).await;

    // max-retries = 2, so three attempts in total
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = create_fetcher(&config);

    match fetcher.fetch(&target(&server, "/flaky")).await {
        Err(FetchError::TransientNetwork { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected TransientNetwork, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_error_fails_fast() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_permissive_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = create_fetcher(&config);

    assert!(matches!(
        fetcher.fetch(&target(&server, "/missing")).await,
        Err(FetchError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_in_flight_requests_are_bounded() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_permissive_robots(&server).await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("slow")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    // max-concurrent = 2
    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let fetcher = Arc::new(create_fetcher(&config));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let fetcher = Arc::clone(&fetcher);
            let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
            // Distinct endpoint keys so pacing does not serialize the calls
            let target = FetchTarget::new(url, &format!("endpoint-{}", i), Duration::from_secs(5));
            tokio::spawn(async move { fetcher.fetch(&target).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "slow");
    }

    assert_eq!(fetcher.peak_in_flight(), 2);
    assert_eq!(fetcher.in_flight(), 0);
}
