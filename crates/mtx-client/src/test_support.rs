use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Transport replaying canned responses in order.
///
/// Once the script is exhausted every further request is recorded, signals
/// [`ScriptedTransport::wait_exhausted`] and then never completes.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    exhausted: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_json(&self, status: u16, body: &str) {
        self.push(Ok(HttpResponse {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn push_transport_error(&self, message: &str) {
        self.push(Err(TransportError::new(message)));
    }

    fn push(&self, outcome: Result<HttpResponse, TransportError>) {
        self.script.lock().expect("script lock").push_back(outcome);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_exhausted(&self) {
        self.exhausted.notified().await;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request);

        tokio::task::yield_now().await;
        let next = self.script.lock().expect("script lock").pop_front();
        let Some(outcome) = next else {
            self.exhausted.notify_one();
            // Stays in flight until the caller drops the future.
            return std::future::pending().await;
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Query parameters of a recorded request.
pub fn query_of(request: &HttpRequest) -> Vec<(String, String)> {
    Url::parse(&request.url)
        .expect("recorded url is absolute")
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn query_value(request: &HttpRequest, key: &str) -> Option<String> {
    query_of(request)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

pub fn path_of(request: &HttpRequest) -> String {
    Url::parse(&request.url)
        .expect("recorded url is absolute")
        .path()
        .to_owned()
}

pub fn sync_body(next_batch: &str, events: &str) -> String {
    format!(
        r#"{{"next_batch":"{next_batch}","rooms":{{"join":{{"!room:hs":{{"timeline":{{"events":[{events}]}}}}}}}}}}"#
    )
}
