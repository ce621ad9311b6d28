use crate::errors::ServiceError;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use shared::http::{make_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Liveness and readiness probes.
///
/// `/ready` answers 200 only while the aggregation listener is accepting requests.
pub struct AdminService {
    ready: Arc<AtomicBool>,
}

impl AdminService {
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        Self { ready }
    }

    fn respond(&self, path: &str) -> Response<BoxBody<Bytes, ServiceError>> {
        match path {
            "/health" => make_text_response(StatusCode::OK, "ok\n"),
            "/ready" if self.ready.load(Ordering::Relaxed) => {
                make_text_response(StatusCode::OK, "ok\n")
            }
            "/ready" => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
            _ => make_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl Service<Request<Incoming>> for AdminService {
    type Response = Response<BoxBody<Bytes, ServiceError>>;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = self.respond(req.uri().path());
        Box::pin(async move { Ok(res) })
    }
}
