use crate::clist::ContestSource;
use crate::config::{Config, Resource};
use crate::contest::RawContest;
use crate::errors::{AggregatorError, Result};
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use metrics::{
    Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use serde_json::Value;
use shared::http::{make_json_response, make_text_response, serve_listener};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub fn test_config(upstream_url: Url) -> Config {
    let mut config = Config::default();
    config.listener.host = "127.0.0.1".to_string();
    config.upstream.url = upstream_url;
    config.upstream.username = "test-user".to_string();
    config.upstream.api_key = "test-key".to_string();
    config
}

pub fn raw_contest(event: &str, href: &str, start: &str) -> RawContest {
    RawContest {
        event: event.to_string(),
        href: href.to_string(),
        start: Some(start.to_string()),
    }
}

/// Canned reply of the mock upstream for one resource id.
pub enum MockReply {
    Json(Value),
    Status(u16, &'static str),
    Raw(&'static str),
    Delayed(Duration, Value),
}

struct MockState {
    replies: HashMap<u32, MockReply>,
    requests: Mutex<Vec<HashMap<String, String>>>,
}

impl MockState {
    async fn reply(&self, req: Request<Incoming>) -> Response<BoxBody<Bytes, AggregatorError>> {
        let query: HashMap<String, String> =
            url::form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                .into_owned()
                .collect();
        let resource_id = query
            .get("resource_id")
            .and_then(|id| id.parse::<u32>().ok());
        self.requests.lock().unwrap().push(query);

        match resource_id.and_then(|id| self.replies.get(&id)) {
            None => make_json_response(StatusCode::OK, r#"{"objects": []}"#),
            Some(MockReply::Json(value)) => make_json_response(StatusCode::OK, value.to_string()),
            Some(MockReply::Status(code, body)) => {
                make_text_response(StatusCode::from_u16(*code).unwrap(), *body)
            }
            Some(MockReply::Raw(body)) => make_text_response(StatusCode::OK, *body),
            Some(MockReply::Delayed(delay, value)) => {
                tokio::time::sleep(*delay).await;
                make_json_response(StatusCode::OK, value.to_string())
            }
        }
    }
}

/// In-process contest listing API. Replies per `resource_id` and records
/// the query of every request it receives. Unknown ids get an empty listing.
pub struct MockUpstream {
    port: u16,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start(replies: HashMap<u32, MockReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(MockState {
            replies,
            requests: Mutex::new(Vec::new()),
        });

        let service_state = state.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let state = service_state.clone();
            async move { Ok::<_, AggregatorError>(state.reply(req).await) }
        });
        tokio::spawn(serve_listener(listener, service));

        MockUpstream { port, state }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}/api/v4/contest/", self.port)).unwrap()
    }

    /// Query parameters of every request received so far.
    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.state.requests.lock().unwrap().clone()
    }
}

/// Canned reply of [`StubSource`] for one resource id.
pub enum StubReply {
    Contests(Vec<RawContest>),
    Delayed(Duration, Vec<RawContest>),
    Fail,
}

/// Contest source answering from memory without any network access.
pub struct StubSource {
    replies: HashMap<u32, StubReply>,
    calls: Mutex<Vec<(u32, String)>>,
}

impl StubSource {
    pub fn new(replies: HashMap<u32, StubReply>) -> Self {
        StubSource {
            replies,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(resource id, start_after)` of every call so far.
    pub fn calls(&self) -> Vec<(u32, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContestSource for StubSource {
    async fn fetch_upcoming(
        &self,
        resource: &Resource,
        start_after: &str,
    ) -> Result<Vec<RawContest>> {
        self.calls
            .lock()
            .unwrap()
            .push((resource.id, start_after.to_string()));

        match self.replies.get(&resource.id) {
            None => Ok(Vec::new()),
            Some(StubReply::Contests(contests)) => Ok(contests.clone()),
            Some(StubReply::Delayed(delay, contests)) => {
                tokio::time::sleep(*delay).await;
                Ok(contests.clone())
            }
            Some(StubReply::Fail) => Err(AggregatorError::UpstreamStatus {
                resource: resource.name.clone(),
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "unavailable".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct TestGauge(Mutex<f64>);

impl GaugeFn for TestGauge {
    fn increment(&self, value: f64) {
        *self.0.lock().unwrap() += value;
    }

    fn decrement(&self, value: f64) {
        *self.0.lock().unwrap() -= value;
    }

    fn set(&self, value: f64) {
        *self.0.lock().unwrap() = value;
    }
}

/// Recorder for use with `metrics::with_local_recorder`. Keeps gauge values
/// and the labels of every histogram handle registered.
#[derive(Default)]
pub struct TestRecorder {
    gauges: Mutex<HashMap<String, Arc<TestGauge>>>,
    histograms: Mutex<Vec<Key>>,
}

impl TestRecorder {
    pub fn gauge(&self, name: &str) -> f64 {
        self.gauges
            .lock()
            .unwrap()
            .get(name)
            .map_or(0.0, |gauge| *gauge.0.lock().unwrap())
    }

    /// Labels of each histogram registration under `name`, in order.
    pub fn histogram_labels(&self, name: &str) -> Vec<Vec<(String, String)>> {
        self.histograms
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.name() == name)
            .map(|key| {
                key.labels()
                    .map(|label| (label.key().to_string(), label.value().to_string()))
                    .collect()
            })
            .collect()
    }
}

impl Recorder for TestRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        let gauge = self
            .gauges
            .lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Gauge::from_arc(gauge)
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        self.histograms.lock().unwrap().push(key.clone());
        Histogram::noop()
    }
}
