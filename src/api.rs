//! REST API client
//!
//! Requests go through a [`Transport`], so the classification of responses
//! and the retry policy do not depend on the HTTP stack underneath.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    config::{ApiConfig, RetryConfig},
    errors::FleetError,
};

/// A request relative to the API base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path and query string, used in logs and errors
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// Raw response as received from the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Sends a request and returns whatever the server answered.
///
/// Implementations only fail with [`FleetError::Network`] when no response
/// was received at all; status handling is left to [`ApiClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, FleetError>;
}

/// [`Transport`] backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, FleetError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_cookie: config.session_cookie.clone(),
        })
    }

    fn network_error(request: &ApiRequest, err: impl ToString) -> FleetError {
        FleetError::Network {
            method: request.method.clone(),
            url: request.url(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, FleetError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| Self::network_error(request, e))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::network_error(request, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| Self::network_error(request, e))?;

        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Typed JSON client on top of a [`Transport`]
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryConfig) -> Self {
        Self { transport, retry }
    }

    /// GET a JSON document, retrying transient failures
    pub async fn get_value(&self, request: ApiRequest) -> Result<Value, FleetError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute(&request).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        method = %request.method,
                        url = %request.url(),
                        status = e.status(),
                        attempt,
                        "Request failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        method = %request.method,
                        url = %request.url(),
                        status = e.status(),
                        "Request failed: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, FleetError> {
        let method = request.method.clone();
        let url = request.url();
        let value = self.get_value(request).await?;
        decode(&method, &url, value)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, FleetError> {
        self.write(Method::POST, path, Some(serde_json::to_value(body)?))
            .await
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, FleetError> {
        self.write(Method::PATCH, path, Some(serde_json::to_value(body)?))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), FleetError> {
        self.write::<Value>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Writes are sent exactly once
    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, FleetError> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;
        let value = self.execute(&request).await.inspect_err(|e| {
            error!(
                method = %request.method,
                url = %request.url(),
                status = e.status(),
                "Request failed: {}",
                e
            );
        })?;
        decode(&request.method, &request.url(), value)
    }

    async fn execute(&self, request: &ApiRequest) -> Result<Value, FleetError> {
        debug!(method = %request.method, url = %request.url(), "Sending request");
        let response = self.transport.send(request).await?;
        classify(request, response)
    }

    /// Full jitter: uniform in `[0, min(max_delay, base_delay * 2^(attempt-1))]`
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .retry
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let cap = exp.min(self.retry.max_delay);
        let millis = cap.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

fn decode<T: DeserializeOwned>(method: &Method, url: &str, value: Value) -> Result<T, FleetError> {
    serde_json::from_value(value).map_err(|e| FleetError::Decode {
        method: method.clone(),
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Turn a raw response into JSON or one of the typed failures.
///
/// HTML bodies are never parsed as data.
pub fn classify(request: &ApiRequest, response: ApiResponse) -> Result<Value, FleetError> {
    let method = request.method.clone();
    let url = request.url();
    let status = response.status;

    if status == 401 {
        return Err(FleetError::AuthenticationRequired { method, url });
    }

    let body = response.body.trim();
    if looks_like_html(response.content_type.as_deref(), body) {
        // Login redirects land on 2xx/3xx; error pages may merely link to one
        if (200..400).contains(&status) && is_login_page(body) {
            return Err(FleetError::AuthenticationRequired { method, url });
        }
        return Err(FleetError::UnexpectedResponse {
            status,
            method,
            url,
            content_type: response
                .content_type
                .unwrap_or_else(|| "text/html".to_string()),
        });
    }

    let success = (200..300).contains(&status);
    if body.is_empty() {
        if success {
            return Ok(Value::Null);
        }
        return Err(FleetError::Http {
            status,
            method,
            url,
            body: String::new(),
        });
    }

    let parsed: Result<Value, _> = serde_json::from_str(body);
    match (success, parsed) {
        (true, Ok(value)) => Ok(value),
        (true, Err(e)) => {
            if is_json_content(response.content_type.as_deref()) {
                Err(FleetError::Decode {
                    method,
                    url,
                    message: e.to_string(),
                })
            } else {
                Err(FleetError::UnexpectedResponse {
                    status,
                    method,
                    url,
                    content_type: response
                        .content_type
                        .unwrap_or_else(|| "unknown".to_string()),
                })
            }
        }
        (false, Ok(value)) => {
            if status == 400 || status == 422 {
                if let Some(message) = validation_message(&value) {
                    return Err(FleetError::Validation { status, message });
                }
            }
            Err(FleetError::Http {
                status,
                method,
                url,
                body: body.to_string(),
            })
        }
        (false, Err(_)) => Err(FleetError::UnexpectedResponse {
            status,
            method,
            url,
            content_type: response
                .content_type
                .unwrap_or_else(|| "unknown".to_string()),
        }),
    }
}

fn is_json_content(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn looks_like_html(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html")) {
        return true;
    }
    let head: String = body.chars().take(15).collect::<String>().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

fn is_login_page(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    ["login", "log in", "sign in", "signin"]
        .iter()
        .any(|marker| lower.contains(marker))
}

fn validation_message(value: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    fn response(status: u16, content_type: Option<&str>, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            content_type: content_type.map(str::to_string),
            body: body.to_string(),
        }
    }

    fn get(path: &str) -> ApiRequest {
        ApiRequest::new(Method::GET, path)
    }

    struct Scripted {
        responses: Mutex<VecDeque<Result<ApiResponse, FleetError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<ApiResponse, FleetError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, FleetError> {
            *self.calls.lock().await += 1;
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(HttpTransport::network_error(request, "script exhausted")))
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn request_url_includes_query() {
        let request = get("/api/tasks").query("vesselId", 4).query("status", "open");
        assert_eq!(request.url(), "/api/tasks?vesselId=4&status=open");
        assert_eq!(get("/api/vessels-management").url(), "/api/vessels-management");
    }

    #[test]
    fn classify_json_success() {
        let value = classify(
            &get("/api/vessels-management"),
            response(200, Some("application/json"), r#"[{"id":1}]"#),
        )
        .unwrap();
        assert_eq!(value, serde_json::json!([{ "id": 1 }]));
    }

    #[test]
    fn classify_empty_success() {
        let value = classify(&get("/api/x"), response(204, None, "")).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn classify_html_login_page_as_auth_required() {
        let err = classify(
            &get("/api/vessels-management"),
            response(
                200,
                Some("text/html; charset=utf-8"),
                "<!DOCTYPE html><html><body><form>Log in</form></body></html>",
            ),
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::AuthenticationRequired { .. }));
    }

    #[test]
    fn classify_html_error_page_as_unexpected() {
        let err = classify(
            &get("/api/vessels-management"),
            response(502, None, "<html><body>Bad gateway</body></html>"),
        )
        .unwrap_err();
        match err {
            FleetError::UnexpectedResponse {
                status,
                content_type,
                ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(content_type, "text/html");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn classify_server_error_page_with_login_link_as_unexpected() {
        let err = classify(
            &get("/api/tasks"),
            response(
                500,
                Some("text/html"),
                "<html><nav><a href=/login>Login</a></nav><h1>Internal Server Error</h1></html>",
            ),
        )
        .unwrap_err();
        match err {
            FleetError::UnexpectedResponse { status, .. } => assert_eq!(status, 500),
            other => panic!("unexpected error: {:?}", other),
        }

        let forbidden = classify(
            &get("/api/tasks"),
            response(403, Some("text/html"), "<html><a href=/login>Sign in</a></html>"),
        )
        .unwrap_err();
        assert!(matches!(
            forbidden,
            FleetError::UnexpectedResponse { status: 403, .. }
        ));
    }

    #[test]
    fn classify_unauthorized() {
        let err = classify(
            &get("/api/vessels-management"),
            response(401, Some("application/json"), r#"{"message":"Unauthorized"}"#),
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::AuthenticationRequired { .. }));
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn classify_validation_error() {
        let request = ApiRequest::new(Method::POST, "/api/vessels-management");
        let err = classify(
            &request,
            response(400, Some("application/json"), r#"{"message":"Name is required"}"#),
        )
        .unwrap_err();
        match err {
            FleetError::Validation { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Name is required");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn classify_http_error_keeps_body() {
        let err = classify(
            &get("/api/voyages/3/calculate"),
            response(404, Some("application/json"), r#"{"error":"not found"}"#),
        )
        .unwrap_err();
        match err {
            FleetError::Http {
                status,
                method,
                url,
                body,
            } => {
                assert_eq!(status, 404);
                assert_eq!(method, Method::GET);
                assert_eq!(url, "/api/voyages/3/calculate");
                assert_eq!(body, r#"{"error":"not found"}"#);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn classify_malformed_json() {
        let err = classify(
            &get("/api/x"),
            response(200, Some("application/json"), "{not json"),
        )
        .unwrap_err();
        assert!(matches!(err, FleetError::Decode { .. }));
    }

    #[tokio::test]
    async fn get_retries_transient_failures() {
        let transport = Scripted::new(vec![
            Ok(response(503, None, "")),
            Err(HttpTransport::network_error(&get("/api/x"), "reset")),
            Ok(response(200, Some("application/json"), r#"{"ok":true}"#)),
        ]);
        let client = ApiClient::new(transport.clone(), fast_retry(3));

        let value = client.get_value(get("/api/x")).await.unwrap();
        assert_eq!(value, serde_json::json!({ "ok": true }));
        assert_eq!(*transport.calls.lock().await, 3);
    }

    #[tokio::test]
    async fn get_gives_up_after_max_attempts() {
        let transport = Scripted::new(vec![
            Ok(response(500, None, "")),
            Ok(response(500, None, "")),
            Ok(response(200, None, "{}")),
        ]);
        let client = ApiClient::new(transport.clone(), fast_retry(2));

        let err = client.get_value(get("/api/x")).await.unwrap_err();
        assert_eq!(err.status(), 500);
        assert_eq!(*transport.calls.lock().await, 2);
    }

    #[tokio::test]
    async fn writes_are_not_retried() {
        let transport = Scripted::new(vec![
            Ok(response(503, None, "")),
            Ok(response(200, None, "{}")),
        ]);
        let client = ApiClient::new(transport.clone(), fast_retry(5));

        let result: Result<Value, _> = client
            .post("/api/vessels-management", &serde_json::json!({ "name": "A" }))
            .await;
        assert!(result.is_err());
        assert_eq!(*transport.calls.lock().await, 1);
    }

    #[tokio::test]
    async fn get_rejects_schema_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Named {
            name: String,
        }

        let transport = Scripted::new(vec![Ok(response(200, None, r#"{"title":"x"}"#))]);
        let client = ApiClient::new(transport, fast_retry(1));

        let err = client.get::<Named>(get("/api/x")).await.unwrap_err();
        assert!(matches!(err, FleetError::Decode { .. }));
    }

    #[test]
    fn backoff_is_bounded() {
        let client = ApiClient::new(Scripted::new(vec![]), RetryConfig::default());
        for attempt in 1..10 {
            assert!(client.backoff(attempt) <= RetryConfig::default().max_delay);
        }
    }
}
