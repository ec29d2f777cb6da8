//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full mirror cycle end-to-end against a temporary output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use sumi_mirror::config::{Config, CrawlerConfig, OutputConfig, ThrottleConfig};
use sumi_mirror::crawler::Crawler;
use sumi_mirror::mapping::PathMapper;
use sumi_mirror::storage::FsStore;
use sumi_mirror::MirrorError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration mirroring `base` into `dir`
fn create_test_config(base: &str, dir: &TempDir) -> Config {
    Config {
        url: format!("{}/", base),
        crawler: CrawlerConfig {
            concurrency: 2,
            tries: 2,
            retry_delay_ms: 10,
            timeout_secs: 5,
            ..Default::default()
        },
        throttle: ThrottleConfig {
            min_delay_ms: 0,
            max_delay_ms: 1000,
            step_ms: 40,
        },
        output: OutputConfig {
            directory: dir.path().to_string_lossy().into_owned(),
        },
        ..Default::default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body),
        "text/html; charset=utf-8",
    )
}

async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Local file of a URL below the output directory
fn local_file(dir: &TempDir, seed: &str, url: &str, is_page: bool) -> PathBuf {
    let mapper = PathMapper::new(&Url::parse(seed).unwrap());
    dir.path().join(mapper.map(&Url::parse(url).unwrap(), is_page))
}

/// Every file below a directory, recursively
fn all_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

fn keys(base: &str, routes: &[&str]) -> Vec<String> {
    let mut keys: Vec<_> = routes.iter().map(|r| format!("{}{}", base, r)).collect();
    keys.sort();
    keys
}

#[tokio::test]
async fn test_crawl_visits_each_page_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<link rel="stylesheet" href="/style.css"><a href="/page2">Page 2</a>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/page2", html(r#"<a href="/">Home</a><a href="/sub/">Sub</a>"#)).await;
    serve(&server, "/sub/", html("<p>Leaf</p>")).await;
    serve(
        &server,
        "/style.css",
        ResponseTemplate::new(200).set_body_raw("body { color: black; }", "text/css"),
    )
    .await;

    let config = create_test_config(&base, &dir);
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();

    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        crawler.processed(),
        keys(&base, &["/", "/page2", "/sub/", "/style.css"])
    );

    let index = local_file(&dir, &seed, &format!("{}/", base), true);
    let stored = std::fs::read_to_string(&index).unwrap();
    assert!(stored.contains(r#"href="page2.html""#));
    assert!(stored.contains(r#"href="style.css""#));

    assert!(local_file(&dir, &seed, &format!("{}/page2", base), true).exists());
    assert!(local_file(&dir, &seed, &format!("{}/sub/", base), true).exists());
    assert!(local_file(&dir, &seed, &format!("{}/style.css", base), false).exists());
    assert_eq!(all_files(dir.path()).len(), 4);
}

#[tokio::test]
async fn test_shared_references_are_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(
        &server,
        "/",
        html(r##"<a href="/a">A</a><a href="/b">B</a><a href="/#top">Top</a><img src="/common.png">"##),
    )
    .await;
    serve(&server, "/a", html(r##"<a href="/common.png#x">C</a><a href="/b#part">B</a>"##)).await;
    serve(&server, "/b", html(r#"<img src="/common.png">"#)).await;

    Mock::given(method("GET"))
        .and(path("/common.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![1u8, 2, 3]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, &dir);
    config.url = format!("{}/#fragment", base);
    config.crawler.concurrency = 4;
    let crawler = Crawler::new(config).unwrap();

    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        crawler.processed(),
        keys(&base, &["/", "/a", "/b", "/common.png"])
    );
}

#[tokio::test]
async fn test_never_referenced_urls_are_not_processed() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/linked">Linked</a>"#)).await;
    serve(&server, "/linked", html("<p>done</p>")).await;
    Mock::given(method("GET"))
        .and(path("/orphan"))
        .respond_with(html("<p>orphan</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let crawler = Crawler::new(create_test_config(&base, &dir)).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert!(!crawler.processed().contains(&format!("{}/orphan", base)));
}

#[tokio::test]
async fn test_rate_limited_page_is_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/limited">Limited</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(html("<p>finally</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, &dir);
    config.crawler.concurrency = 1;
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();

    crawler.start(&CancellationToken::new()).await.unwrap();

    // Raised to the 40ms step by the 429, then lowered by the 200
    let delay = crawler.throttle_delay();
    assert!(delay > Duration::ZERO);
    assert!(delay < Duration::from_millis(40));

    let stored = local_file(&dir, &seed, &format!("{}/limited", base), true);
    assert!(std::fs::read_to_string(stored).unwrap().contains("finally"));
    assert_eq!(all_files(dir.path()).len(), 2);

    let stats = crawler.statistics();
    assert_eq!(stats.statuses.get(&429), Some(&1));
    assert_eq!(stats.requeued, 1);
}

#[tokio::test]
async fn test_not_modified_page_yields_local_links() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, &dir);
    let seed = config.url.clone();

    let index = local_file(&dir, &seed, &seed, true);
    std::fs::create_dir_all(index.parent().unwrap()).unwrap();
    std::fs::write(&index, r#"<html><body><a href="/kept">Kept</a></body></html>"#).unwrap();
    let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
    std::fs::File::options()
        .write(true)
        .open(&index)
        .unwrap()
        .set_modified(old)
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/kept", html("<p>kept</p>")).await;

    let crawler = Crawler::new(config).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(crawler.processed(), keys(&base, &["/", "/kept"]));
    assert_eq!(crawler.statistics().not_modified, 1);

    // The local copy was neither re-downloaded nor touched
    assert!(std::fs::read_to_string(&index).unwrap().contains(r#"href="/kept""#));
    assert_eq!(std::fs::metadata(&index).unwrap().modified().unwrap(), old);
}

#[tokio::test]
async fn test_second_run_follows_links_of_unchanged_page() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base, &dir);
    let seed = config.url.clone();

    serve(
        &server,
        "/",
        html(r#"<a href="/page2">Page 2</a>"#)
            .insert_header("last-modified", "Sun, 06 Nov 1994 08:49:37 GMT"),
    )
    .await;
    serve(&server, "/page2", html("<p>first</p>")).await;

    let first = Crawler::new(config.clone()).unwrap();
    first.start(&CancellationToken::new()).await.unwrap();
    assert_eq!(first.processed(), keys(&base, &["/", "/page2"]));

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html("<p>second</p>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2.html"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;

    let second = Crawler::new(config).unwrap();
    second.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(second.processed(), keys(&base, &["/", "/page2"]));
    let stats = second.statistics();
    assert_eq!(stats.not_modified, 1);
    assert_eq!(stats.dropped, 0);

    let page2 = local_file(&dir, &seed, &format!("{}/page2", base), true);
    assert!(std::fs::read_to_string(page2).unwrap().contains("second"));
}

#[tokio::test]
async fn test_external_assets_use_prefixed_directory() {
    let server = MockServer::start().await;
    let external = MockServer::start().await;
    let base = server.uri();
    let ext = external.uri();
    let dir = TempDir::new().unwrap();

    serve(
        &server,
        "/",
        html(&format!(
            r#"<img src="{ext}/logo.png"><img src="/logo.png"><a href="{ext}/page">Elsewhere</a>"#
        )),
    )
    .await;
    serve(
        &server,
        "/logo.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(b"local".to_vec()),
    )
    .await;
    serve(
        &external,
        "/logo.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(b"external".to_vec()),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<p>not mirrored</p>"))
        .expect(0)
        .mount(&external)
        .await;

    let config = create_test_config(&base, &dir);
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    let local_logo = local_file(&dir, &seed, &format!("{}/logo.png", base), false);
    let external_logo = local_file(&dir, &seed, &format!("{}/logo.png", ext), false);

    assert_ne!(local_logo, external_logo);
    assert_eq!(std::fs::read(local_logo).unwrap(), b"local");
    assert_eq!(std::fs::read(&external_logo).unwrap(), b"external");

    let host = Url::parse(&ext).unwrap();
    let prefix = format!("_{}:{}", host.host_str().unwrap(), host.port().unwrap());
    assert!(external_logo
        .components()
        .any(|c| c.as_os_str().to_string_lossy() == prefix));
}

#[tokio::test]
async fn test_cancellation_leaves_no_partial_files() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/slow.bin">Big</a>"#)).await;
    serve(
        &server,
        "/slow.bin",
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/octet-stream")
            .set_body_bytes(vec![0u8; 1 << 20])
            .set_delay(Duration::from_secs(4)),
    )
    .await;

    let config = create_test_config(&base, &dir);
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = crawler.start(&cancel).await.unwrap_err();
    assert!(matches!(err, MirrorError::Cancelled));

    let files = all_files(dir.path());
    assert!(files.iter().all(|f| !f
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with(".tmp")));
    assert!(!local_file(&dir, &seed, &format!("{}/slow.bin", base), false).exists());
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let crawler = Crawler::new(create_test_config(&server.uri(), &dir)).unwrap();
    let err = crawler.start(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        MirrorError::RetriesExhausted { status: 500, .. }
    ));
    assert!(all_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_client_errors_do_not_abort() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/missing">Gone</a><a href="/ok">Ok</a>"#)).await;
    serve(&server, "/missing", ResponseTemplate::new(404)).await;
    serve(&server, "/ok", html("<p>ok</p>")).await;

    let crawler = Crawler::new(create_test_config(&base, &dir)).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(crawler.processed(), keys(&base, &["/", "/missing", "/ok"]));
    let stats = crawler.statistics();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.pages_written, 2);
}

#[tokio::test]
async fn test_timeout_aborts_without_retry() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/slow">Slow</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<p>late</p>").set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, &dir);
    config.crawler.timeout_secs = 1;
    config.crawler.tries = 3;
    let crawler = Crawler::new(config).unwrap();

    let err = crawler.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, MirrorError::Timeout { .. }));
}

#[tokio::test]
async fn test_unexpected_status_aborts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    serve(&server, "/", ResponseTemplate::new(302)).await;

    let crawler = Crawler::new(create_test_config(&server.uri(), &dir)).unwrap();
    let err = crawler.start(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        MirrorError::UnexpectedStatus { status: 302, .. }
    ));
}

#[tokio::test]
async fn test_seed_redirect_rebases_the_mirror() {
    let old_host = MockServer::start().await;
    let new_host = MockServer::start().await;
    let new_base = new_host.uri();
    let dir = TempDir::new().unwrap();

    serve(
        &old_host,
        "/",
        ResponseTemplate::new(301).insert_header("location", format!("{}/start", new_base).as_str()),
    )
    .await;
    serve(&new_host, "/start", html(r#"<a href="/next">Next</a>"#)).await;
    serve(&new_host, "/next", html("<p>next</p>")).await;

    let crawler = Crawler::new(create_test_config(&old_host.uri(), &dir)).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    let processed = crawler.processed();
    assert!(processed.contains(&format!("{}/", old_host.uri())));
    assert!(processed.contains(&format!("{}/start", new_base)));
    assert!(processed.contains(&format!("{}/next", new_base)));

    let new_seed = format!("{}/start", new_base);
    assert_eq!(
        crawler.start_host(),
        PathMapper::new(&Url::parse(&new_seed).unwrap()).start_host()
    );
    assert!(local_file(&dir, &new_seed, &new_seed, true).exists());
    assert!(local_file(&dir, &new_seed, &format!("{}/next", new_base), true).exists());
}

#[tokio::test]
async fn test_depth_limit_stops_discovery() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/one">1</a>"#)).await;
    serve(&server, "/one", html(r#"<a href="/two">2</a>"#)).await;
    Mock::given(method("GET"))
        .and(path("/two"))
        .respond_with(html("<p>too deep</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, &dir);
    config.crawler.max_depth = 1;
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(crawler.processed(), keys(&base, &["/", "/one"]));

    let one = local_file(&dir, &seed, &format!("{}/one", base), true);
    let stored = std::fs::read_to_string(one).unwrap();
    assert!(stored.contains(&format!(r#"href="{}/two""#, base)));
}

#[tokio::test]
async fn test_exclude_pattern_skips_urls() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    serve(&server, "/", html(r#"<a href="/public">P</a><a href="/private/x">X</a>"#)).await;
    serve(&server, "/public", html("<p>public</p>")).await;
    Mock::given(method("GET"))
        .and(path("/private/x"))
        .respond_with(html("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = create_test_config(&base, &dir);
    config.crawler.excludes = vec!["/private/".to_string()];
    let seed = config.url.clone();
    let crawler = Crawler::new(config).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert_eq!(crawler.processed(), keys(&base, &["/", "/public"]));

    // Only mirrored pages are linked locally
    let index = std::fs::read_to_string(local_file(&dir, &seed, &seed, true)).unwrap();
    assert!(index.contains(r#"href="public.html""#));
    assert!(index.contains(&format!(r#"href="{}/private/x""#, base)));
}

#[tokio::test]
async fn test_custom_store_receives_files() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();

    serve(&server, "/", html("<p>home</p>")).await;

    let config = create_test_config(&server.uri(), &dir);
    let crawler = Crawler::with_store(config, Arc::new(FsStore::new(elsewhere.path()))).unwrap();
    crawler.start(&CancellationToken::new()).await.unwrap();

    assert!(all_files(dir.path()).is_empty());
    assert_eq!(all_files(elsewhere.path()).len(), 1);
}
