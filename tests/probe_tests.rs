//! Probe executor against real HTTP via wiremock.
use std::time::Duration;

use url_probe_rs::probe::probe;
use url_probe_rs::scanner::scan;
use url_probe_rs::transport::HttpTransport;
use url_probe_rs::types::ScanConfig;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> ScanConfig {
    ScanConfig {
        timeout: 5.0,
        user_agent: "Probe-Test/0.1".into(),
        ..ScanConfig::default()
    }
}

#[tokio::test]
async fn success_captures_allow_listed_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("user-agent", "Probe-Test/0.1"))
        .and(header("upgrade-insecure-requests", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("server", "mock-httpd")
                .insert_header("x-powered-by", "wiremock")
                .insert_header("x-request-id", "abc123")
                .set_body_string("hello world"),
        )
        .mount(&server)
        .await;

    let config = test_config();
    let transport = HttpTransport::new(&config).unwrap();
    let url = format!("{}/", server.uri());
    let r = probe(&transport, &url, &config).await;

    assert_eq!(r.status_code, Some(200), "error: {:?}", r.error);
    assert_eq!(r.status_text, "OK");
    assert_eq!(r.server, "mock-httpd");
    assert_eq!(r.content_length, 11);
    assert_eq!(r.headers.get("x-powered-by").map(String::as_str), Some("wiremock"));
    assert!(!r.headers.contains_key("x-request-id"));
    assert!(r.error.is_none());
    assert!(r.redirect_url.is_none());
    assert!(r.ssl_info.is_none());
    assert!(r.response_time_ms >= 0.0);
}

#[tokio::test]
async fn detailed_headers_capture_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-request-id", "abc123"))
        .mount(&server)
        .await;

    let config = ScanConfig {
        detailed_headers: true,
        ..test_config()
    };
    let transport = HttpTransport::new(&config).unwrap();
    let r = probe(&transport, &server.uri(), &config).await;

    assert_eq!(r.headers.get("x-request-id").map(String::as_str), Some("abc123"));
    assert_eq!(r.server, "Unknown");
}

#[tokio::test]
async fn redirects_followed_up_to_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = test_config();
    let transport = HttpTransport::new(&config).unwrap();
    let r = probe(&transport, &format!("{}/old", server.uri()), &config).await;
    assert_eq!(r.status_code, Some(200));
    assert!(r.redirect_url.is_none());
}

#[tokio::test]
async fn unfollowed_redirect_records_location() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "https://elsewhere.test/"))
        .mount(&server)
        .await;

    let config = ScanConfig {
        max_redirects: 0,
        ..test_config()
    };
    let transport = HttpTransport::new(&config).unwrap();
    let r = probe(&transport, &server.uri(), &config).await;
    assert_eq!(r.status_code, Some(302));
    assert_eq!(r.redirect_url.as_deref(), Some("https://elsewhere.test/"));
}

#[tokio::test]
async fn client_and_server_errors_keep_status() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config();
    let transport = HttpTransport::new(&config).unwrap();
    let missing = probe(&transport, &format!("{}/missing", server.uri()), &config).await;
    let broken = probe(&transport, &format!("{}/broken", server.uri()), &config).await;
    assert_eq!(missing.status_code, Some(404));
    assert_eq!(missing.status_text, "Not Found");
    assert!(missing.error.is_none());
    assert_eq!(broken.status_code, Some(500));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = ScanConfig {
        timeout: 0.3,
        ..test_config()
    };
    let transport = HttpTransport::new(&config).unwrap();
    let r = probe(&transport, &server.uri(), &config).await;
    assert_eq!(r.status_code, None);
    assert_eq!(r.error.as_deref(), Some("Request timeout"));
    assert!(r.response_time_ms >= 250.0);
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    // Grab a free port, then close it so nothing is listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = test_config();
    let transport = HttpTransport::new(&config).unwrap();
    let r = probe(&transport, &format!("http://127.0.0.1:{port}/"), &config).await;
    assert_eq!(r.status_code, None);
    assert!(r.error.as_deref().unwrap().starts_with("Client error:"), "{:?}", r.error);
    assert_eq!(r.status_text, "Network Error");
    assert!(r.headers.is_empty());
}

#[tokio::test]
async fn scan_over_real_transport() {
    let server = MockServer::start().await;
    Mock::given(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let urls = vec![
        format!("{}/ok", server.uri()),
        format!("{}/gone", server.uri()),
        "not-a-url".to_string(),
    ];
    let outcome = scan(&urls, test_config(), 2).await.unwrap();
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.stats.success, 1);
    assert_eq!(outcome.stats.client_errors, 1);
    assert_eq!(outcome.stats.network_errors, 1);
    assert_eq!(outcome.stats.completed, 3);
}
