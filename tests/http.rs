//! Client against a local HTTP server standing in for the search API and
//! the index host

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prost::Message;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use versearch_client::proto::{Response, VerseKey, VerseResult};
use versearch_client::{
    download_index, AppState, ClientConfig, Dispatched, HttpIndexSource, HttpSearchApi,
    IndexPhase, IndexSource, MemoryStore, OfflineState, RemoteSearch, SearchEngine, VerseIdentity,
};

const INDEX: &[u8] = b"versearch-index-v1";

#[derive(Default)]
struct ServerState {
    searches: AtomicUsize,
    index_gets: AtomicUsize,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

fn verse(book: u32, chapter: u32, verse: u32, text: &[&str], top: u32, highlights: &[&str]) -> VerseResult {
    VerseResult {
        key: Some(VerseKey { book, chapter, verse }),
        text: text.iter().map(|t| t.to_string()).collect(),
        top_translation: top,
        highlights: highlights.iter().map(|h| h.to_string()).collect(),
    }
}

async fn search(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(params): Query<SearchQuery>,
) -> impl IntoResponse {
    state.searches.fetch_add(1, Ordering::SeqCst);

    let accepts_protobuf = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/protobuf"))
        .unwrap_or(false);
    if !accepts_protobuf {
        return (StatusCode::NOT_ACCEPTABLE, Vec::new());
    }

    let response = match params.q.as_str() {
        "faith" => Response {
            results: vec![
                verse(57, 11, 1, &["Now faith is the substance", "Faith is confidence"], 0, &["faith"]),
                verse(44, 10, 17, &["So then faith cometh by hearing"], 0, &["faith"]),
            ],
        },
        "fail" => return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
        "garbage" => return (StatusCode::OK, vec![0xFF, 0xFF, 0xFF]),
        _ => Response::default(),
    };
    (StatusCode::OK, response.encode_to_vec())
}

async fn index_head() -> impl IntoResponse {
    [(header::CONTENT_LENGTH, INDEX.len().to_string())]
}

async fn index_get(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.index_gets.fetch_add(1, Ordering::SeqCst);
    INDEX.to_vec()
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Serve the fake API on an ephemeral port, returning its base URL
async fn serve() -> (String, Arc<ServerState>) {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/api", get(search))
        .route("/index.pb", get(index_get).head(index_head))
        .route("/missing.pb", get(missing).head(missing))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

/// Accepts only the served index; every hit is Genesis 1:1
struct FixedEngine;

impl SearchEngine for FixedEngine {
    fn init(&mut self, index: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(index == INDEX, "unexpected index of {} bytes", index.len());
        Ok(())
    }

    fn search(&self, q: &str) -> Response {
        Response {
            results: vec![verse(0, 1, 1, &["In the beginning"], 0, &[q])],
        }
    }
}

fn config(base: &str) -> ClientConfig {
    ClientConfig {
        api_url: format!("{}/api", base),
        index_url: format!("{}/index.pb", base),
        data_dir: std::env::temp_dir(),
        ..ClientConfig::default()
    }
}

fn app_state(base: &str) -> AppState {
    let config = config(base);
    let client = reqwest::Client::new();
    AppState::new(
        config.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(HttpSearchApi::with_client(client.clone(), &config.api_url)),
        Arc::new(HttpIndexSource::with_client(client, &config.index_url)),
        FixedEngine,
    )
    .unwrap()
}

#[tokio::test]
async fn test_search_api_sends_query_and_accept_header() {
    let (base, server) = serve().await;
    let api = HttpSearchApi::new(&config(&base)).unwrap();

    let bytes = api.search("faith").await.unwrap();
    let decoded = Response::decode(bytes).unwrap();
    assert_eq!(decoded.results.len(), 2);
    assert_eq!(server.searches.load(Ordering::SeqCst), 1);

    assert!(api.search("fail").await.is_err());
}

#[tokio::test]
async fn test_index_source_reports_length_and_streams() {
    let (base, _) = serve().await;
    let source = HttpIndexSource::new(&config(&base)).unwrap();
    assert_eq!(source.content_length().await.unwrap(), Some(INDEX.len() as u64));

    let (_tx, cancel) = watch::channel(false);
    let mut last = 0.0;
    let bytes = download_index(&source, None, &cancel, |p| last = p.fraction())
        .await
        .unwrap();
    assert_eq!(bytes, INDEX);
    assert_eq!(last, 1.0);
}

#[tokio::test]
async fn test_index_source_http_error_fails_download() {
    let (base, _) = serve().await;
    let source = HttpIndexSource::with_client(reqwest::Client::new(), &format!("{}/missing.pb", base));
    let (_tx, cancel) = watch::channel(false);
    assert!(download_index(&source, None, &cancel, |_| {}).await.is_err());
}

#[tokio::test]
async fn test_enabled_but_uninitialized_searches_remote() {
    let (base, server) = serve().await;
    let state = app_state(&base);

    let downloading = OfflineState {
        enabled: true,
        loading: true,
        ..OfflineState::default()
    };
    let Dispatched::Remote(handle) = state.dispatcher().dispatch("faith", &downloading) else {
        panic!("expected a remote search");
    };
    handle.await.unwrap();

    let record = state.cache().lookup_exact("faith").unwrap();
    assert!(!record.in_flight);
    assert_eq!(record.results.len(), 2);
    assert_eq!(state.cache().body_count(), 2);
    assert_eq!(server.searches.load(Ordering::SeqCst), 1);

    let hebrews = state.verse_body(&VerseIdentity::from("Hebrews 11:1")).unwrap();
    assert_eq!(hebrews.text(1), Some("Faith is confidence"));
    assert_eq!(record.results[1].id.as_str(), "Romans 10:17");
    assert_eq!(record.results[0].highlight_words, vec!["faith".to_string()]);
}

#[tokio::test]
async fn test_failed_and_malformed_responses_complete_empty() {
    let (base, _) = serve().await;
    let state = app_state(&base);

    for q in ["fail", "garbage"] {
        let Dispatched::Remote(handle) = state.search(q) else {
            panic!("expected a remote search");
        };
        handle.await.unwrap();
        let record = state.cache().lookup_exact(q).unwrap();
        assert!(!record.in_flight, "{}", q);
        assert!(record.results.is_empty(), "{}", q);
    }
}

#[tokio::test]
async fn test_enable_offline_then_search_locally() {
    let (base, server) = serve().await;
    let state = app_state(&base);

    state.lifecycle().enable().await.unwrap();
    assert_eq!(state.offline_state().phase(), IndexPhase::Ready);
    assert_eq!(server.index_gets.load(Ordering::SeqCst), 1);

    assert!(matches!(state.search("beginning"), Dispatched::Engine));
    let record = state.cache().settled("beginning").await.unwrap();
    assert_eq!(record.results[0].id.as_str(), "Genesis 1:1");
    assert_eq!(server.searches.load(Ordering::SeqCst), 0);

    // disabling routes back to the remote API
    state.lifecycle().disable().await.unwrap();
    assert!(matches!(state.search("faith"), Dispatched::Remote(_)));
}
