#![forbid(unsafe_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, head},
};
use bytes::Bytes;
use futures::StreamExt;
use cairn_net::{HttpClient, Net, NetError, NetExt, NetOptions, RangeSpec, RetryPolicy};
use rstest::{fixture, rstest};
use tokio::net::TcpListener;
use url::Url;

const BODY: &[u8] = b"cairn asset payload";

struct TestServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.unwrap();
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn body_endpoint() -> &'static [u8] {
    BODY
}

async fn range_endpoint(headers: HeaderMap) -> impl IntoResponse {
    let Some(range) = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("bytes="))
    else {
        return (StatusCode::OK, HeaderMap::new(), BODY.to_vec());
    };

    let (start, end) = range.split_once('-').unwrap_or((range, ""));
    let start: usize = start.parse().unwrap_or(0);
    let end: usize = if end.is_empty() {
        BODY.len() - 1
    } else {
        end.parse().unwrap_or(BODY.len() - 1)
    };
    let slice = &BODY[start..=end.min(BODY.len() - 1)];

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_RANGE,
        format!("bytes {start}-{end}/{}", BODY.len()).parse().unwrap(),
    );
    (StatusCode::PARTIAL_CONTENT, response_headers, slice.to_vec())
}

async fn head_endpoint() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, BODY.len().into());
    headers.insert(header::CONTENT_TYPE, "application/octet-stream".parse().unwrap());
    (headers, ())
}

async fn ignore_range_endpoint() -> &'static [u8] {
    BODY
}

async fn slow_endpoint() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "too late"
}

async fn missing_endpoint() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

async fn broken_endpoint() -> impl IntoResponse {
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Clone, Default)]
struct Flaky {
    hits: Arc<AtomicUsize>,
}

async fn flaky_endpoint(State(flaky): State<Flaky>) -> impl IntoResponse {
    match flaky.hits.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => "ok after retries".into_response(),
    }
}

#[fixture]
fn router() -> Router {
    Router::new()
        .route("/asset.bin", get(body_endpoint))
        .route("/range.bin", get(range_endpoint))
        .route("/meta.bin", head(head_endpoint))
        .route("/ignore-range.bin", get(ignore_range_endpoint))
        .route("/slow.bin", get(slow_endpoint))
        .route("/missing.bin", get(missing_endpoint))
        .route("/broken.bin", get(broken_endpoint))
        .route("/flaky.bin", get(flaky_endpoint))
        .with_state(Flaky::default())
}

#[fixture]
fn client() -> HttpClient {
    HttpClient::new(NetOptions::default())
}

async fn collect(mut stream: cairn_net::ByteStream) -> Result<Vec<u8>, NetError> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_bytes_fetches_whole_body(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let bytes = client.get_bytes(server.url("/asset.bin"), None).await.unwrap();
    assert_eq!(bytes, Bytes::from_static(BODY));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn stream_yields_full_body(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let stream = client.stream(server.url("/asset.bin"), None).await.unwrap();
    assert_eq!(collect(stream).await.unwrap(), BODY);
}

#[rstest]
#[case(0, Some(4), &BODY[0..=4])]
#[case(6, Some(10), &BODY[6..=10])]
#[case(6, None, &BODY[6..])]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_range_honors_range_header(
    router: Router,
    client: HttpClient,
    #[case] start: u64,
    #[case] end: Option<u64>,
    #[case] expected: &[u8],
) {
    let server = TestServer::start(router).await;
    let stream = client
        .get_range(server.url("/range.bin"), RangeSpec::new(start, end), None)
        .await
        .unwrap();
    assert_eq!(collect(stream).await.unwrap(), expected);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn get_range_accepts_servers_that_ignore_range(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let stream = client
        .get_range(server.url("/ignore-range.bin"), RangeSpec::from_start(5), None)
        .await
        .unwrap();
    // A 200 with the full body is accepted; the caller deals with it.
    assert_eq!(collect(stream).await.unwrap(), BODY);
}

#[rstest]
#[case("/missing.bin", 404)]
#[case("/broken.bin", 500)]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn non_success_status_maps_to_http_status(
    router: Router,
    client: HttpClient,
    #[case] path: &str,
    #[case] status: u16,
) {
    let server = TestServer::start(router).await;
    let err = client.get_bytes(server.url(path), None).await.unwrap_err();
    assert_eq!(err.status_code(), Some(status));
    assert_eq!(err.is_retryable(), status >= 500);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn head_reports_content_length(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let headers = client.head(server.url("/meta.bin"), None).await.unwrap();
    assert_eq!(headers.get("content-length"), Some(BODY.len().to_string().as_str()));
    assert_eq!(headers.get("content-type"), Some("application/octet-stream"));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn timeout_decorator_maps_deadline_to_timeout_error(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let bounded = client.with_timeout(Duration::from_millis(200));
    let err = bounded.get_bytes(server.url("/slow.bin"), None).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn retry_decorator_recovers_from_5xx(router: Router, client: HttpClient) {
    let server = TestServer::start(router).await;
    let retrying = client.with_retry(RetryPolicy::new(
        3,
        Duration::from_millis(10),
        Duration::from_millis(50),
    ));
    let bytes = retrying.get_bytes(server.url("/flaky.bin"), None).await.unwrap();
    assert_eq!(bytes, Bytes::from("ok after retries"));
}
