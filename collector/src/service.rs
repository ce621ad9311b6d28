//! The aggregation endpoint: `POST /` with a JSON object of filters.

use crate::config::{Config, CorsConfig};
use crate::errors::ServiceError;
use crate::filters::FilterPayload;
use crate::metrics_defs::{AGGREGATION_DURATION, AGGREGATION_RECORDS};
use crate::pipeline::Collector;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, HeaderMap, HeaderValue, ORIGIN, VARY,
};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{full_body, make_error_response, make_json_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;

type ServiceResponse = Response<BoxBody<Bytes, ServiceError>>;

#[derive(Clone)]
pub struct CollectorService {
    collector: Arc<Collector>,
    cors: Arc<CorsConfig>,
    max_body_bytes: usize,
}

impl CollectorService {
    pub fn new(collector: Arc<Collector>, config: &Config) -> Self {
        Self {
            collector,
            cors: Arc::new(config.cors.clone()),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> ServiceResponse
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let origin = req.headers().get(ORIGIN).cloned();

        let mut response = match (req.method(), req.uri().path()) {
            (&Method::OPTIONS, _) => preflight_response(),
            (&Method::POST, "/") => self.aggregate(req.into_body()).await,
            (_, "/") => make_error_response(StatusCode::METHOD_NOT_ALLOWED),
            _ => make_error_response(StatusCode::NOT_FOUND),
        };

        apply_cors(&self.cors, origin, response.headers_mut());
        response
    }

    async fn aggregate<B>(&self, body: B) -> ServiceResponse
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let filters = match read_filters(body, self.max_body_bytes).await {
            Ok(filters) => filters,
            Err(response) => return response,
        };

        let started = Instant::now();
        let result = self.collector.collect(&filters).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        shared::histogram!(AGGREGATION_DURATION, "status" => status)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(aggregate) => {
                shared::histogram!(AGGREGATION_RECORDS).record(aggregate.len() as f64);
                match serde_json::to_vec(&aggregate) {
                    Ok(json) => make_json_response(StatusCode::OK, json),
                    Err(e) => make_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, ?filters, "aggregation failed");
                make_text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl Service<Request<Incoming>> for CollectorService {
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

async fn read_filters<B>(body: B, limit: usize) -> Result<FilterPayload, ServiceResponse>
where
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(make_error_response(StatusCode::PAYLOAD_TOO_LARGE));
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return Err(make_error_response(StatusCode::BAD_REQUEST));
        }
    };

    FilterPayload::from_slice(&bytes).map_err(|e| {
        make_text_response(StatusCode::BAD_REQUEST, format!("invalid filters: {e}\n"))
    })
}

fn preflight_response() -> ServiceResponse {
    let mut response = Response::new(full_body(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
    response
}

fn apply_cors(cors: &CorsConfig, origin: Option<HeaderValue>, headers: &mut HeaderMap) {
    headers.insert(VARY, HeaderValue::from_static("Origin"));

    let Some(origin) = origin else {
        return;
    };
    let allowed = origin.to_str().map(|o| cors.allows(o)).unwrap_or(false);
    if !allowed {
        return;
    }

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}
