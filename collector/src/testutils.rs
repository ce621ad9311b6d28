use crate::config::{
    AuthConfig, Config, CorsConfig, Listener, RetryConfig, UpstreamConfig,
};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Retry policy with millisecond backoff so retry tests stay fast.
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        http_timeout_secs: 5,
    }
}

/// Config whose auth endpoint is `<base>/auth` and data endpoint `<base>/records`.
pub fn test_config(base: &str) -> Config {
    Config {
        listener: Listener {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        admin_listener: Listener {
            host: "127.0.0.1".to_string(),
            port: 3001,
        },
        auth: AuthConfig {
            url: Url::parse(&format!("{base}/auth")).unwrap(),
            body: serde_json::json!({"username": "svc", "password": "secret"}),
        },
        upstream: UpstreamConfig {
            url: Url::parse(&format!("{base}/records")).unwrap(),
            workspace: "ws-1".to_string(),
            page_deduction: 0,
            max_concurrency: 3,
        },
        retry: fast_retry(5),
        cors: CorsConfig::default(),
        max_body_bytes: 1024,
        aggregation_timeout_secs: None,
    }
}

#[derive(Default)]
struct UpstreamState {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    total: AtomicUsize,
    pages: Mutex<Vec<u32>>,
    failing_page: Option<u32>,
}

/// Data endpoint that answers `{"data": [<page>]}` after a fixed delay and
/// records how many requests were outstanding at once.
///
/// A failing page, if set, gets an immediate 500 instead.
pub struct MockUpstream {
    port: u16,
    state: Arc<UpstreamState>,
}

impl MockUpstream {
    pub async fn start(delay: Duration) -> Self {
        Self::start_with(delay, None).await
    }

    pub async fn start_failing(delay: Duration, failing_page: u32) -> Self {
        Self::start_with(delay, Some(failing_page)).await
    }

    async fn start_with(delay: Duration, failing_page: Option<u32>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(UpstreamState {
            failing_page,
            ..Default::default()
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let state = server_state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, Infallible>(respond(&state, req, delay).await) }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockUpstream { port, state }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> usize {
        self.state.total.load(Ordering::SeqCst)
    }

    /// Page numbers in the order their requests arrived.
    pub fn requested_pages(&self) -> Vec<u32> {
        self.state.pages.lock().unwrap().clone()
    }
}

async fn respond(
    state: &UpstreamState,
    req: Request<Incoming>,
    delay: Duration,
) -> Response<Full<Bytes>> {
    let page = req
        .uri()
        .query()
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse::<u32>().ok())
        })
        .unwrap_or(0);

    state.pages.lock().unwrap().push(page);

    if state.failing_page == Some(page) {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return response;
    }

    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    tokio::time::sleep(delay).await;

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    state.total.fetch_add(1, Ordering::SeqCst);

    let body = serde_json::json!({ "data": [page] });
    Response::new(Full::new(Bytes::from(body.to_string())))
}
