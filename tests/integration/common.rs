//! Shared fixtures for the integration tests

use std::path::Path;
use trend_relay::config::{parse_config, Config};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TRENDING_PAGE: &str = r#"
<html><body>
  <article class="row">
    <h2><a href="/acme/rocket">acme / rocket</a></h2>
    <p class="desc">A fast rocket</p>
    <span class="lang">Rust</span>
    <a class="stars" href="/acme/rocket/stargazers">1,234</a>
    <span class="gained">85 stars today</span>
  </article>
  <article class="row">
    <h2><a href="/beta/tool">beta / tool</a></h2>
    <p class="desc">A handy tool</p>
    <span class="lang">Go</span>
    <a class="stars" href="/beta/tool/stargazers">2.5k</a>
  </article>
  <article class="row">
    <h2><a href="/tiny/toy">tiny / toy</a></h2>
    <span class="lang">Rust</span>
    <a class="stars" href="/tiny/toy/stargazers">12</a>
  </article>
</body></html>
"#;

/// Builds a validated configuration pointing every endpoint at local servers
///
/// The collection page lives at `{site}/trending/{range}`; providers are
/// "primary" and "secondary", both rooted at `{providers}/<id>`.
pub fn create_test_config(site: &str, providers: &str, dir: &Path, extra: &str) -> Config {
    let content = format!(
        r#"
[user-agent]
crawler-name = "TestRelay"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[fetcher]
max-concurrent = 2
request-timeout-secs = 5
max-retries = 2
backoff-base-ms = 10
backoff-cap-ms = 50

[rate-limit]
initial-interval-ms = 10
min-interval-ms = 10
max-interval-ms = 200

[collection]
url-template = "{site}/trending/{{range}}"

[parser]
item = "article.row"
name = "h2 a"
description = "p.desc"
language = "span.lang"
stars = "a.stars"
period-stars = "span.gained"

[filters]
min-total-stars = 100

[enrichment]
chain = ["primary", "secondary"]
max-retries = 1
timeout-secs = 5
backoff-base-ms = 10
backoff-cap-ms = 20

[[enrichment.provider]]
id = "primary"
base-url = "{providers}/primary"
model = "primary-model"
api-key = "key-1"

[[enrichment.provider]]
id = "secondary"
base-url = "{providers}/secondary"
model = "secondary-model"
api-key = "key-2"

[scheduler]
max-retries = 1
retry-delay-secs = 0

[output]
database-path = "{db}"
delivery-dir = "{out}"

{extra}
"#,
        site = site,
        providers = providers,
        db = dir.join("relay.db").display(),
        out = dir.join("out").display(),
        extra = extra,
    );

    parse_config(&content).expect("test config should be valid")
}

/// Mounts a robots.txt that allows everything
pub async fn mount_permissive_robots(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(server)
        .await;
}

/// A chat-completions response carrying `content`
pub fn chat_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}
