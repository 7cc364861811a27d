use crate::errors::AggregatorError;
use crate::fanout::Aggregator;
use crate::metrics_defs::{CONTESTS_RETURNED, REQUEST_DURATION, REQUESTS_INFLIGHT};
use http::header::{ALLOW, HeaderValue};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{
    add_cors_headers, make_boxed_error_response, make_json_response, make_preflight_response,
    make_text_response,
};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

pub const LIVENESS_MESSAGE: &str = "Clist.by v4 combined-backend is up";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch combined contests";
const FETCH_FAILED_BODY: &[u8] = br#"{"error":"Failed to fetch combined contests"}"#;

pub type ServiceBody = BoxBody<Bytes, AggregatorError>;

/// Deployment target the service is running as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Long-running server with a liveness route on `/`
    Standalone,
    /// Function invoked once per request; only `/api` is exposed
    Function,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Liveness,
    Contests,
}

impl Route {
    fn name(&self) -> &'static str {
        match self {
            Route::Liveness => "liveness",
            Route::Contests => "contests",
        }
    }
}

/// Counts a request in `requests.inflight` for as long as it lives and
/// records `request.duration` when dropped. A request dropped before a
/// response was produced is recorded with status `cancelled`.
struct RequestGuard {
    started: Instant,
    inflight: metrics::Gauge,
    route: Option<Route>,
    status: Option<StatusCode>,
}

impl RequestGuard {
    fn new(route: Option<Route>) -> Self {
        let inflight = shared::gauge!(REQUESTS_INFLIGHT);
        inflight.increment(1.0);

        Self {
            started: Instant::now(),
            inflight,
            route,
            status: None,
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.inflight.decrement(1.0);

        let status = self
            .status
            .map_or_else(|| "cancelled".to_string(), |s| s.as_str().to_string());
        shared::histogram!(
            REQUEST_DURATION,
            "status" => status,
            "route" => self.route.map_or("none", |r| r.name())
        )
        .record(self.started.elapsed().as_secs_f64());
    }
}

#[derive(Clone)]
pub struct AggregatorService {
    aggregator: Aggregator,
    variant: Variant,
}

impl AggregatorService {
    pub fn new(aggregator: Aggregator, variant: Variant) -> Self {
        Self {
            aggregator,
            variant,
        }
    }

    fn match_route(&self, path: &str) -> Option<Route> {
        match path {
            "/" if self.variant == Variant::Standalone => Some(Route::Liveness),
            "/api" | "/api/" => Some(Route::Contests),
            _ => None,
        }
    }

    /// Produces the response for a request to `path`. Request bodies are
    /// never read, so only the method and path are needed.
    pub async fn handle(&self, method: &Method, path: &str) -> Response<ServiceBody> {
        let route = self.match_route(path);
        let mut guard = RequestGuard::new(route);

        let mut response = match route {
            None => make_boxed_error_response(StatusCode::NOT_FOUND),
            Some(_) if method == Method::OPTIONS => make_preflight_response(),
            Some(_) if method != Method::GET && method != Method::HEAD => {
                let mut response = make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET, HEAD, OPTIONS"));
                response
            }
            Some(Route::Liveness) => make_text_response(StatusCode::OK, LIVENESS_MESSAGE),
            Some(Route::Contests) => self.contests_response().await,
        };
        add_cors_headers(response.headers_mut());

        guard.status = Some(response.status());
        response
    }

    async fn contests_response(&self) -> Response<ServiceBody> {
        let result = match self.aggregator.upcoming_contests().await {
            Ok(contests) => serde_json::to_vec(&contests)
                .map(|json| (contests.len(), json))
                .map_err(AggregatorError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok((count, json)) => {
                shared::histogram!(CONTESTS_RETURNED).record(count as f64);
                make_json_response(StatusCode::OK, json)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    upstream_status = ?e.upstream_status(),
                    upstream_body = e.upstream_body().unwrap_or_default(),
                    "Combined API error"
                );
                make_json_response(StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED_BODY)
            }
        }
    }
}

impl Service<Request<Incoming>> for AggregatorService {
    type Response = Response<ServiceBody>;
    type Error = AggregatorError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move {
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "Received request");
            Ok(service.handle(req.method(), req.uri().path()).await)
        })
    }
}
