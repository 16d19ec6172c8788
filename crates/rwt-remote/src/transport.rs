// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP transport.
//!
//! A [`Request`] describes exactly one HTTP exchange. It is either awaited
//! inline ([`Request::send_sync`]) or spawned ([`Request::send`]), in which
//! case the returned [`Exchange`] delivers the completion exactly once and
//! releases itself afterwards.
//!
//! Disposing an [`Exchange`] aborts the in-flight request; a response that
//! arrives later is dropped on the floor and never reaches the caller.
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::new()?);
//! let completion = Request::new(transport, "http://localhost:8080/rap")
//!     .with_data(message.to_json()?)
//!     .send_sync()
//!     .await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Content type of every protocol exchange.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// HTTP method of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Fully resolved request handed to a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Per-request timeout (`None` waits indefinitely).
    pub timeout: Option<Duration>,
}

/// Response of a completed exchange, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub response_text: String,
    pub status: u16,
    /// Header map with lower-cased keys.
    pub response_headers: HashMap<String, String>,
    /// URL of the exchange that produced this response.
    pub target: String,
}

impl Response {
    /// Build a response, normalizing header names to lower case.
    pub fn new<I, K, V>(target: impl Into<String>, status: u16, text: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let response_headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            response_text: text.into(),
            status,
            response_headers,
            target: target.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Transport-level failure (no HTTP response at all).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct NetworkError(pub String);

/// Outcome of an unsuccessful exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    #[error("HTTP {} from {}", .0.status, .0.target)]
    Status(Response),

    #[error("Connection error on {target}: {message}")]
    Network { target: String, message: String },

    #[error("Exchange disposed")]
    Disposed,
}

impl ExchangeError {
    /// HTTP status of the failure (0 when no response was received).
    pub fn status(&self) -> u16 {
        match self {
            Self::Status(response) => response.status,
            Self::Network { .. } | Self::Disposed => 0,
        }
    }

    /// Network-level failures are retryable; HTTP errors are not.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Result delivered once per exchange.
pub type Completion = Result<Response, ExchangeError>;

/// Executes a single HTTP request.
pub trait Transport: Send + Sync + 'static {
    /// Perform the request and return whatever the server answered.
    ///
    /// Non-200 statuses are *not* errors at this level; only failures to
    /// obtain a response are.
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

// ============================================================================
// reqwest backend
// ============================================================================

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport. Timeouts are applied per request.
    pub fn new() -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| NetworkError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, request: HttpRequest) -> Result<Response, NetworkError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| NetworkError(e.to_string()))?;

        Ok(Response::new(request.url, status, text, headers))
    }
}

// ============================================================================
// Request / Exchange
// ============================================================================

/// One HTTP exchange, configured before sending.
#[derive(Debug)]
pub struct Request<T: Transport> {
    transport: Arc<T>,
    url: String,
    method: HttpMethod,
    data: Option<String>,
    timeout: Option<Duration>,
}

impl<T: Transport> Request<T> {
    /// Create a POST request for `url`.
    pub fn new(transport: Arc<T>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            method: HttpMethod::default(),
            data: None,
            timeout: None,
        }
    }

    /// Builder: set the HTTP method.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder: set the payload (query string for GET, body for POST).
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Builder: set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Target URL as configured (before any query string is appended).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Resolve into the request handed to the transport.
    pub fn to_http(&self) -> HttpRequest {
        let (url, body) = match (self.method, &self.data) {
            (HttpMethod::Get, Some(data)) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                (format!("{}{}{}", self.url, separator, data), None)
            }
            (_, data) => (self.url.clone(), data.clone()),
        };
        HttpRequest {
            method: self.method,
            url,
            body,
            headers: vec![("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string())],
            timeout: self.timeout,
        }
    }

    /// Perform the exchange inline and return its completion.
    pub async fn send_sync(self) -> Completion {
        let request = self.to_http();
        debug!("{} {} (sync)", request.method, request.url);
        let outcome = self.transport.execute(request).await;
        classify(&self.url, outcome)
    }

    /// Spawn the exchange. The completion is read from the returned handle.
    pub fn send(self) -> Exchange {
        let request = self.to_http();
        debug!("{} {} (async)", request.method, request.url);

        let (tx, rx) = oneshot::channel();
        let target = self.url;
        let transport = self.transport;
        let task_target = target.clone();
        let task = tokio::spawn(async move {
            let completion = classify(&task_target, transport.execute(request).await);
            // Receiver gone means the exchange was disposed.
            let _ = tx.send(completion);
        });

        Exchange {
            target,
            receiver: Some(rx),
            task: Some(task),
        }
    }
}

/// Map a transport outcome onto success (strictly HTTP 200) or error.
fn classify(target: &str, outcome: Result<Response, NetworkError>) -> Completion {
    match outcome {
        Ok(response) if response.status == 200 => Ok(response),
        Ok(response) => Err(ExchangeError::Status(response)),
        Err(NetworkError(message)) => Err(ExchangeError::Network {
            target: target.to_string(),
            message,
        }),
    }
}

/// Handle on a spawned exchange.
#[derive(Debug)]
pub struct Exchange {
    target: String,
    receiver: Option<oneshot::Receiver<Completion>>,
    task: Option<JoinHandle<()>>,
}

impl Exchange {
    /// Target URL.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Wait for the completion.
    ///
    /// Yields the outcome exactly once; the exchange is disposed afterwards
    /// and every later call returns [`ExchangeError::Disposed`].
    pub async fn completion(&mut self) -> Completion {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(ExchangeError::Disposed);
        };
        let completion = receiver.await.unwrap_or(Err(ExchangeError::Disposed));
        self.dispose();
        completion
    }

    /// Check if a completion is still expected.
    pub fn is_pending(&self) -> bool {
        self.receiver.is_some()
    }

    /// Abort the exchange and drop the completion channel. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver = None;
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.dispose();
    }
}
