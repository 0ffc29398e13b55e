//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end over real HTTP.

use std::sync::Arc;
use trawler::crawler::DEFAULT_USER_AGENT;
use trawler::{crawl, CrawlEvent, CrawlOptions, Crawler, HttpTransport, StopReason};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Creates crawl options seeded at the mock server root
fn create_test_options(base_url: &str) -> CrawlOptions {
    CrawlOptions {
        base_url: Some(format!("{}/", base_url)),
        request_maxpersecond: Some(100),
        request_wait: Some(5_000),
        ..CrawlOptions::default()
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

fn create_crawler(options: CrawlOptions) -> Crawler {
    let transport =
        Arc::new(HttpTransport::new(DEFAULT_USER_AGENT).expect("Failed to build transport"));
    Crawler::with_options(transport, options).expect("Failed to configure crawler")
}

/// Number of requests the server received for `target`
async fn hits(server: &MockServer, target: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request: &&Request| request.url.path() == target)
        .count()
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            </body></html>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<a href="/">Home</a><a href="page2">2</a>"#.to_string()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<p>Leaf</p>".to_string()))
        .mount(&mock_server)
        .await;

    let crawler = crawl(create_test_options(&base_url))
        .await
        .expect("Crawl should succeed");

    assert_eq!(crawler.stop_reason(), Some(StopReason::Exhausted));
    assert_eq!(crawler.completed_requests(), 3);
    assert_eq!(crawler.history().total(), 3);

    let root = format!("{}/", base_url);
    let page2 = format!("{}/page2", base_url);

    let entry = crawler.history().get(&page2).expect("page2 logged");
    assert_eq!(entry.requests.len(), 1);
    assert_eq!(entry.requests[0].status, 200);
    assert_eq!(entry.requests[0].size, "<p>Leaf</p>".len());
    assert!(entry.referrers.contains(&root));

    // Each page fetched exactly once
    assert_eq!(hits(&mock_server, "/").await, 1);
    assert_eq!(hits(&mock_server, "/page1").await, 1);
    assert_eq!(hits(&mock_server, "/page2").await, 1);
}

#[tokio::test]
async fn test_missing_page_is_logged() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/gone">gone</a>"#.to_string()))
        .mount(&mock_server)
        .await;

    let crawler = crawl(create_test_options(&base_url))
        .await
        .expect("Crawl should succeed");

    let gone = crawler
        .history()
        .get(&format!("{}/gone", base_url))
        .expect("404 page logged");
    assert_eq!(gone.requests[0].status, 404);
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/moved"))
        .mount(&mock_server)
        .await;

    let crawler = crawl(create_test_options(&base_url))
        .await
        .expect("Crawl should succeed");

    let root = crawler
        .history()
        .get(&format!("{}/", base_url))
        .expect("root logged");
    assert_eq!(root.requests[0].status, 301);
    assert_eq!(hits(&mock_server, "/moved").await, 0);
}

#[tokio::test]
async fn test_cookies_sent_back() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html(r#"<a href="/account">account</a>"#.to_string())
                .insert_header("set-cookie", "session=xyz; Path=/"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .and(header("cookie", "session=xyz"))
        .respond_with(html("welcome back".to_string()))
        .mount(&mock_server)
        .await;

    let mut options = create_test_options(&base_url);
    options.request_concurrent = Some(1);
    let crawler = crawl(options).await.expect("Crawl should succeed");

    let account = crawler
        .history()
        .get(&format!("{}/account", base_url))
        .expect("account logged");
    assert_eq!(account.requests[0].status, 200);
}

#[tokio::test]
async fn test_configured_headers_sent() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-crawl-run", "nightly"))
        .and(header_exists("user-agent"))
        .respond_with(html(String::new()))
        .mount(&mock_server)
        .await;

    let mut options = create_test_options(&base_url);
    options.headers = Some([("X-Crawl-Run".to_string(), "nightly".to_string())].into());
    let crawler = crawl(options).await.expect("Crawl should succeed");

    let root = crawler
        .history()
        .get(&format!("{}/", base_url))
        .expect("root logged");
    assert_eq!(root.requests[0].status, 200);
}

#[tokio::test]
async fn test_rel_and_external_links_not_followed() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<a href="/inside">in</a>
               <a href="/sponsored" rel="sponsored">ad</a>
               <a href="https://external.invalid/">out</a>"#
                .to_string(),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/inside"))
        .respond_with(html(String::new()))
        .mount(&mock_server)
        .await;

    let crawler = crawl(create_test_options(&base_url))
        .await
        .expect("Crawl should succeed");

    assert_eq!(crawler.history().total(), 2);
    assert_eq!(hits(&mock_server, "/sponsored").await, 0);
    assert!(crawler
        .history()
        .get("https://external.invalid/")
        .is_none());
}

#[tokio::test]
async fn test_parse_workers() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let links: String = (0..6)
        .map(|i| format!(r#"<a href="/p{}">{}</a>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(links))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .respond_with(html("leaf".to_string()))
        .mount(&mock_server)
        .await;

    let mut options = create_test_options(&base_url);
    options.parser_threads = Some(2);
    options.parser_method = Some("html".to_string());

    let mut crawler = create_crawler(options);
    assert_eq!(crawler.parser_workers(), 2);
    let mut events = crawler.subscribe();

    let reason = crawler.run().await;

    assert_eq!(reason, StopReason::Exhausted);
    assert_eq!(crawler.completed_requests(), 7);
    assert_eq!(crawler.parser_workers(), 0);

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        if let CrawlEvent::Complete { reason } = event {
            assert_eq!(reason, StopReason::Exhausted);
            completed = true;
        }
    }
    assert!(completed);
}

#[tokio::test]
async fn test_unreachable_host_is_contained() {
    // Nothing listens on the discard port
    let options = CrawlOptions {
        base_url: Some("http://127.0.0.1:9/".to_string()),
        request_wait: Some(2_000),
        ..CrawlOptions::default()
    };

    let crawler = crawl(options).await.expect("Crawl should succeed");

    assert_eq!(crawler.completed_requests(), 1);
    let root = crawler
        .history()
        .get("http://127.0.0.1:9/")
        .expect("root logged");
    assert_eq!(root.requests[0].status, 0);
}
