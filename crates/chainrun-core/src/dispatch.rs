//! HTTP dispatch of composed requests.

use crate::compose::{ComposedRequest, RequestBody};
use crate::config::RunnerConfig;
use crate::types::FailureKind;
use reqwest::redirect::Policy;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Raw response captured for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header values; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Time from sending the request until the body was read.
    pub latency_ms: u64,
}

/// Transport-level failure of a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Connect(_) => FailureKind::Connect,
            Self::Other(_) => FailureKind::Transport,
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = describe(err);
        if err.is_timeout() {
            Self::Timeout(message)
        } else if err.is_connect() {
            Self::Connect(message)
        } else {
            Self::Other(message)
        }
    }
}

/// Error message including its source chain.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Sends composed requests. Implementations must be shareable across
/// concurrent runs.
pub trait Dispatch: Send + Sync {
    /// Send one request and capture the response.
    fn dispatch(
        &self,
        request: &ComposedRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// `reqwest`-backed dispatcher. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    /// Build a client with the configured timeout, redirect limit, TLS policy
    /// and user agent.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(Self { client })
    }
}

impl Dispatch for HttpDispatcher {
    async fn dispatch(&self, request: &ComposedRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Multipart(pairs) => {
                let form = pairs
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name.clone(), value.clone())
                    });
                builder.multipart(form)
            }
            RequestBody::Raw(text) => builder.body(text.clone()),
        };

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = response.status().as_u16();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let Ok(text) = value.to_str() else { continue };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(text);
                })
                .or_insert_with(|| text.to_string());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{RequestParts, build_request};
    use crate::types::Step;
    use httpmock::prelude::*;
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn dispatcher(timeout_ms: u64) -> Result<HttpDispatcher, TransportError> {
        HttpDispatcher::from_config(&RunnerConfig {
            timeout_ms,
            ..RunnerConfig::default()
        })
    }

    fn request_for(step: &Step, base: &str) -> Result<ComposedRequest, Box<dyn std::error::Error>> {
        Ok(build_request(step, RequestParts::from_step(step), Some(base))?)
    }

    #[tokio::test]
    async fn test_dispatch_json_post() -> TestResult {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/orders")
                    .header("content-type", "application/json")
                    .header("cache-control", "no-cache")
                    .json_body(json!({"qty": 2}));
                then.status(201)
                    .header("x-request-id", "r-1")
                    .json_body(json!({"id": 10}));
            })
            .await;

        let mut step = Step::new(1, "POST", "/orders");
        step.body_params.insert("qty".to_string(), json!(2));
        let request = request_for(&step, &server.base_url())?;

        let response = dispatcher(5_000)?.dispatch(&request).await?;
        mock.assert_async().await;
        assert_eq!(response.status, 201);
        assert_eq!(response.headers.get("x-request-id").map(String::as_str), Some("r-1"));
        assert_eq!(serde_json::from_str::<serde_json::Value>(&response.body)?, json!({"id": 10}));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_form_body() -> TestResult {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/login").body("user=bob&pass=s3cret");
                then.status(200).body("welcome");
            })
            .await;

        let mut step = Step::new(1, "POST", "/login");
        step.body_params.insert("user".to_string(), json!("bob"));
        step.body_params.insert("pass".to_string(), json!("s3cret"));
        step.headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        let request = request_for(&step, &server.base_url())?;

        let response = dispatcher(5_000)?.dispatch(&request).await?;
        mock.assert_async().await;
        assert_eq!(response.body, "welcome");
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_timeout_is_classified() -> TestResult {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow");
                then.status(200).delay(Duration::from_millis(1_000));
            })
            .await;

        let step = Step::new(1, "GET", "/slow");
        let request = request_for(&step, &server.base_url())?;

        let result = dispatcher(100)?.dispatch(&request).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_dispatch_connect_failure_is_classified() -> TestResult {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let step = Step::new(1, "GET", "/");
        let request = request_for(&step, &format!("http://127.0.0.1:{port}"))?;

        let result = dispatcher(2_000)?.dispatch(&request).await;
        let Err(err) = result else {
            return Err("expected a connect failure".into());
        };
        assert_eq!(err.kind(), FailureKind::Connect);
        Ok(())
    }
}
