use crate::config::RetryConfig;
use crate::errors::TransportError;
use crate::metrics_defs::UPSTREAM_RETRIES;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

/// JSON-over-HTTP client that retries every failed attempt.
///
/// An attempt fails on a transport error, a non-2xx status, or a body that is
/// not valid JSON. Callers only ever see the final outcome: the decoded body of
/// the first successful attempt, or a [`TransportError`] carrying the message of
/// the last failure once `max_attempts` attempts have been made.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl HttpClient {
    pub fn new(retry: &RetryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(retry.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            max_attempts: retry.max_attempts.max(1),
            initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
        })
    }

    pub async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<Value, TransportError> {
        self.request(Method::GET, url, None, headers).await
    }

    pub async fn post(
        &self,
        url: &Url,
        payload: &Value,
        headers: &HeaderMap,
    ) -> Result<Value, TransportError> {
        self.request(Method::POST, url, Some(payload), headers).await
    }

    pub async fn request(
        &self,
        method: Method,
        url: &Url,
        payload: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<Value, TransportError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let message = match self.attempt(method.clone(), url, payload, headers).await {
                Ok(body) => return Ok(body),
                Err(message) => message,
            };

            if attempt >= self.max_attempts {
                tracing::warn!(%method, %url, attempt, error = %message, "giving up on request");
                return Err(TransportError {
                    method,
                    url: url.to_string(),
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.backoff_delay(attempt);
            tracing::debug!(
                %method,
                %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "request attempt failed, retrying"
            );
            shared::counter!(UPSTREAM_RETRIES).increment(1);

            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &Url,
        payload: Option<&Value>,
        headers: &HeaderMap,
    ) -> Result<Value, String> {
        let mut builder = self
            .client
            .request(method, url.clone())
            .headers(headers.clone());
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("upstream responded with status {status}"));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("failed to decode response body: {e}"))
    }

    /// Delay before retry number `retry_number` (1-based): doubles each time, capped.
    fn backoff_delay(&self, retry_number: u32) -> Duration {
        let shift = retry_number.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::fast_retry;
    use reqwest::header::{CONTENT_TYPE, HeaderValue};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(max_attempts: u32) -> HttpClient {
        HttpClient::new(&fast_retry(max_attempts)).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_get_success_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [1]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(5);
        let body = client
            .get(&url(&server, "/data"), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(body, json!({"data": [1]}));
    }

    #[tokio::test]
    async fn test_post_sends_json_payload_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"user": "svc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = test_client(5);
        let body = client
            .post(&url(&server, "/token"), &json!({"user": "svc"}), &headers)
            .await
            .unwrap();

        assert_eq!(body["token"], "t");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let server = MockServer::start().await;

        // The first four attempts fail, the fifth succeeds
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(4)
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(5);
        let body = client
            .get(&url(&server, "/flaky"), &HeaderMap::new())
            .await
            .unwrap();

        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(5)
            .mount(&server)
            .await;

        let client = test_client(5);
        let err = client
            .get(&url(&server, "/down"), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 5);
        assert_eq!(err.method, Method::GET);
        assert!(err.message.contains("500"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_invalid_json_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(2);
        let err = client
            .get(&url(&server, "/html"), &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert!(err.message.contains("decode"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Release the port so connecting fails
        drop(listener);

        let client = test_client(2);
        let err = client
            .get(
                &Url::parse(&format!("http://{addr}/data")).unwrap(),
                &HeaderMap::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let client = HttpClient::new(&RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            http_timeout_secs: 1,
        })
        .unwrap();

        assert_eq!(client.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(350));
        assert_eq!(client.backoff_delay(30), Duration::from_millis(350));
    }
}
