//! In-memory transport with scripted responses
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_sync::{
    api::{ApiClient, ApiRequest, ApiResponse, Transport},
    cache::QueryCache,
    config::RetryConfig,
    context::VesselContext,
    errors::FleetError,
};
use reqwest::Method;
use tokio::sync::{oneshot, Mutex};

type Route = (Method, String);

/// Responses are queued per `(method, path)`; the last one stays in place
/// and answers every further request. Unknown routes answer 404.
///
/// A request that finds a gate queued for its route picks its response
/// immediately but only returns once the gate is released.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<Route, VecDeque<ApiResponse>>>,
    gates: Mutex<HashMap<Route, VecDeque<oneshot::Receiver<()>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn respond(&self, method: Method, path: &str, response: ApiResponse) {
        self.routes
            .lock()
            .await
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Hold the next request to `(method, path)` until the sender fires
    pub async fn hold(&self, method: Method, path: &str) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.gates
            .lock()
            .await
            .entry((method, path.to_string()))
            .or_default()
            .push_back(gate);
        release
    }

    pub async fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, FleetError> {
        let route = (request.method.clone(), request.path.clone());
        let (response, gate) = {
            let mut routes = self.routes.lock().await;
            let response = match routes.get_mut(&route) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            let gate = self
                .gates
                .lock()
                .await
                .get_mut(&route)
                .and_then(|gates| gates.pop_front());
            (response, gate)
        };
        self.requests.lock().await.push(request.clone());

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(response.unwrap_or_else(|| json(404, r#"{"error":"no route"}"#)))
    }
}

pub fn json(status: u16, body: &str) -> ApiResponse {
    ApiResponse {
        status,
        content_type: Some("application/json".to_string()),
        body: body.to_string(),
    }
}

pub fn html(status: u16, body: &str) -> ApiResponse {
    ApiResponse {
        status,
        content_type: Some("text/html".to_string()),
        body: body.to_string(),
    }
}

pub fn context(transport: Arc<MockTransport>) -> Arc<VesselContext> {
    let retry = RetryConfig {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    };
    let api = ApiClient::new(transport, retry);
    Arc::new(VesselContext::new(api, Arc::new(QueryCache::new())))
}
