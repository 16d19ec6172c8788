// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request cycle.
//!
//! The [`Connection`] exclusively owns the operation log. A send takes the
//! current log, stamps its head, serializes it, POSTs it and replays the
//! server's answer through the lifecycle orchestrator. Connection errors are
//! retried with linear backoff up to the configured cap; server errors are
//! reported immediately.

use crate::config::{ClientConfig, ConfigError};
use crate::lifecycle::{self, BatchReport};
use crate::operation_log::{LogError, OperationLog};
use crate::protocol::{ClientMessage, ServerMessage, HEAD_CONNECTION_ID, HEAD_REQUEST_COUNTER};
use crate::registry::{Registry, RegistryError};
use crate::remote::{RemoteObject, RemoteObjects};
use crate::retry::Backoff;
use crate::transport::{ExchangeError, HttpTransport, NetworkError, Request, Response, Transport};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Operation log error: {0}")]
    Log(#[from] LogError),

    #[error("Connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Connection statistics.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Messages POSTed successfully.
    pub messages_sent: AtomicU64,

    /// Operations carried by those messages.
    pub operations_sent: AtomicU64,

    /// Retries after connection errors.
    pub retries: AtomicU64,

    /// Server instructions applied.
    pub instructions_applied: AtomicU64,

    /// Server instructions skipped after a failure.
    pub instruction_failures: AtomicU64,
}

impl ConnectionStats {
    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            operations_sent: self.operations_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            instructions_applied: self.instructions_applied.load(Ordering::Relaxed),
            instruction_failures: self.instruction_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of connection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub messages_sent: u64,
    pub operations_sent: u64,
    pub retries: u64,
    pub instructions_applied: u64,
    pub instruction_failures: u64,
}

/// Owner of the operation log, the registry and the request cycle.
pub struct Connection<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    log: OperationLog,
    registry: Registry,
    remote_objects: RemoteObjects,
    request_counter: Option<Value>,
    backoff: Backoff,
    send_deadline: Option<Instant>,
    stats: Arc<ConnectionStats>,
}

impl Connection<HttpTransport> {
    /// Connect over HTTP.
    pub fn open(config: ClientConfig, registry: Registry) -> Result<Self, ConnectionError> {
        let transport = Arc::new(HttpTransport::new()?);
        Self::new(config, transport, registry)
    }
}

impl<T: Transport> Connection<T> {
    /// Create a connection over an arbitrary transport.
    pub fn new(config: ClientConfig, transport: Arc<T>, registry: Registry) -> Result<Self, ConnectionError> {
        config.validate()?;
        Ok(Self {
            backoff: Backoff::new(config.retry),
            config,
            transport,
            log: OperationLog::new(),
            registry,
            remote_objects: RemoteObjects::new(),
            request_counter: None,
            send_deadline: None,
            stats: Arc::new(ConnectionStats::default()),
        })
    }

    /// Write view over the entity `id`.
    pub fn remote_object(&mut self, id: &str) -> RemoteObject<'_, T> {
        RemoteObject::new(self, id)
    }

    /// Send only if the log carries operations.
    pub async fn flush(&mut self) -> Result<Option<BatchReport>, ConnectionError> {
        if !self.log.has_operations() {
            self.send_deadline = None;
            return Ok(None);
        }
        self.send().await.map(Some)
    }

    /// Send the current log (even if empty) and apply the answer.
    ///
    /// If no answer can be applied, the operations go back into the log and
    /// ride along with the next send.
    pub async fn send(&mut self) -> Result<BatchReport, ConnectionError> {
        self.send_deadline = None;

        let mut log = std::mem::take(&mut self.log);
        if let Some(counter) = &self.request_counter {
            log.append_head(HEAD_REQUEST_COUNTER, counter.clone())?;
        }
        if let Some(cid) = &self.config.connection_id {
            log.append_head(HEAD_CONNECTION_ID, Value::String(cid.clone()))?;
        }
        let message = log.create_message()?;
        log.dispose()?;

        let answer = match self.transmit(&message).await {
            Ok(answer) => answer,
            Err(e) => {
                if !message.operations.is_empty() {
                    warn!(
                        "Requeueing {} operations after failed send",
                        message.operations.len()
                    );
                    self.log.requeue(message.operations)?;
                }
                return Err(e);
            }
        };
        if let Some(counter) = answer.request_counter() {
            self.request_counter = Some(counter.clone());
        }

        let report = lifecycle::apply_instructions(
            &mut self.registry,
            &mut self.remote_objects,
            &answer.operations,
        );
        self.stats
            .instructions_applied
            .fetch_add(report.applied as u64, Ordering::Relaxed);
        self.stats
            .instruction_failures
            .fetch_add(report.failures.len() as u64, Ordering::Relaxed);
        Ok(report)
    }

    /// POST `message` and parse an error-free answer.
    async fn transmit(&mut self, message: &ClientMessage) -> Result<ServerMessage, ConnectionError> {
        let body = message.to_json()?;
        let operations = message.operations.len() as u64;
        debug!(
            "Sending {} operations (requestCounter {:?})",
            operations, self.request_counter
        );

        let response = self.exchange(body).await?;
        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .operations_sent
            .fetch_add(operations, Ordering::Relaxed);

        let answer = ServerMessage::from_json(&response.response_text)?;
        if let Some(reason) = answer.error() {
            error!("Server reported error: {}", reason);
            return Err(ConnectionError::Server {
                status: response.status,
                message: reason.to_string(),
            });
        }
        Ok(answer)
    }

    async fn exchange(&mut self, body: String) -> Result<Response, ConnectionError> {
        loop {
            let completion = Request::new(self.transport.clone(), &self.config.url)
                .with_data(body.clone())
                .with_timeout(self.config.request_timeout())
                .send_sync()
                .await;

            match completion {
                Ok(response) => {
                    self.backoff.reset();
                    return Ok(response);
                }
                Err(e) if e.is_connection_error() => match self.backoff.next_retry() {
                    Some(delay) => {
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "{}, retry {} in {:?}",
                            e,
                            self.backoff.retry_count(),
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        let attempts = self.backoff.retry_count() + 1;
                        self.backoff.reset();
                        error!("Giving up after {} attempts: {}", attempts, e);
                        return Err(ConnectionError::ConnectionFailed { attempts });
                    }
                },
                Err(ExchangeError::Status(response)) => {
                    error!("Request rejected with HTTP {}", response.status);
                    let message = if response.response_text.is_empty() {
                        format!("HTTP {}", response.status)
                    } else {
                        response.response_text
                    };
                    return Err(ConnectionError::Server {
                        status: response.status,
                        message,
                    });
                }
                Err(e) => {
                    return Err(ConnectionError::Server {
                        status: e.status(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Request a send no later than `delay` from now.
    pub fn schedule_send(&mut self, delay: Duration) {
        let deadline = Instant::now() + delay;
        self.send_deadline = Some(match self.send_deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    /// Pending delayed-send deadline.
    pub fn send_deadline(&self) -> Option<Instant> {
        self.send_deadline
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut OperationLog {
        &mut self.log
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn remote_objects(&self) -> &RemoteObjects {
        &self.remote_objects
    }

    pub(crate) fn remote_objects_mut(&mut self) -> &mut RemoteObjects {
        &mut self.remote_objects
    }

    /// Counter last received from the server.
    pub fn request_counter(&self) -> Option<&Value> {
        self.request_counter.as_ref()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::registry::{DescriptorBuilder, Mirror};
    use crate::registry::value::expect_str;
    use crate::test_support::ScriptedTransport;
    use crate::transport::HttpMethod;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Text {
        text: String,
    }

    impl Mirror for Text {}

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                DescriptorBuilder::<Text>::new("test.Text")
                    .factory(|_, _| Ok(Text::default()))
                    .property("text", |mirror, v| {
                        mirror.text = expect_str("text", v)?.to_string();
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        registry
    }

    fn connection(transport: Arc<ScriptedTransport>) -> Connection<ScriptedTransport> {
        let config = ClientConfig::new("http://host/rap")
            .with_retry(RetryConfig::new(Duration::from_millis(100), 3))
            .without_server_push();
        Connection::new(config, transport, registry()).unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_updates_mirror() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({
            "head": {"requestCounter": 1},
            "operations": [["create", "w1", "test.Text", {"text": "initial"}]]
        }));
        transport.push_json(json!({
            "head": {"requestCounter": 2},
            "operations": [["set", "w1", {"text": "hello-ack"}]]
        }));
        let mut connection = connection(transport.clone());

        let report = connection.send().await.unwrap();
        assert_eq!(report.created, vec!["w1"]);
        assert_eq!(connection.registry().get::<Text>("w1").unwrap().text, "initial");

        let mut remote = connection.remote_object("w1");
        remote.set("text", "hello").unwrap();
        remote.call("focus", None).await.unwrap();

        let messages = transport.posted_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["head"], json!({"requestCounter": 1}));
        assert_eq!(
            messages[1]["operations"],
            json!([["set", "w1", {"text": "hello"}], ["call", "w1", "focus", {}]])
        );
        assert_eq!(
            connection.registry().get::<Text>("w1").unwrap().text,
            "hello-ack"
        );
        assert_eq!(connection.request_counter(), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_flush_skips_empty_log() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut connection = connection(transport.clone());
        assert_eq!(connection.flush().await.unwrap(), None);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_connection_id_in_head() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = ClientConfig::new("http://host/rap").with_connection_id("c7");
        let mut connection = Connection::new(config, transport.clone(), registry()).unwrap();
        connection.send().await.unwrap();
        assert_eq!(transport.posted_messages()[0]["head"], json!({"connectionId": "c7"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_network_error("reset");
        transport.push_network_error("reset");
        transport.push_json(json!({"head": {}, "operations": []}));
        let mut connection = connection(transport.clone());

        let start = Instant::now();
        connection.send().await.unwrap();

        let times: Vec<_> = transport
            .request_times(HttpMethod::Post)
            .into_iter()
            .map(|t| t - start)
            .collect();
        assert_eq!(
            times,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300)
            ]
        );
        assert_eq!(connection.stats().snapshot().retries, 2);
        assert_eq!(connection.stats().snapshot().messages_sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cap_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..6 {
            transport.push_network_error("refused");
        }
        let mut connection = connection(transport.clone());

        let err = connection.send().await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionFailed { attempts: 4 }));
        assert_eq!(transport.requests().len(), 4);
        assert_eq!(connection.stats().snapshot().retries, 3);
    }

    #[tokio::test]
    async fn test_server_error_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(500, "internal failure");
        let mut connection = connection(transport.clone());

        let err = connection.send().await.unwrap_err();
        match err {
            ConnectionError::Server { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal failure");
            }
            other => panic!("Expected Server, got {:?}", other),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_head_error_skips_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({
            "head": {"error": "session expired"},
            "operations": [["create", "w1", "test.Text", {}]]
        }));
        let mut connection = connection(transport);

        assert!(matches!(
            connection.send().await,
            Err(ConnectionError::Server { .. })
        ));
        assert!(!connection.registry().contains("w1"));
    }

    #[tokio::test]
    async fn test_malformed_answer_is_protocol_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, "<html>");
        let mut connection = connection(transport);
        assert!(matches!(
            connection.send().await,
            Err(ConnectionError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_requeues_operations() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({
            "head": {},
            "operations": [["create", "w1", "test.Text", {}]]
        }));
        transport.push_response(500, "");
        let mut connection = connection(transport.clone());
        connection.send().await.unwrap();

        connection.remote_object("w1").set("text", "hello").unwrap();
        assert!(connection.send().await.is_err());
        assert_eq!(connection.log().len(), 1);

        connection.remote_object("w1").set("enabled", false).unwrap();
        connection.send().await.unwrap();

        let messages = transport.posted_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[2]["operations"],
            json!([["set", "w1", {"text": "hello", "enabled": false}]])
        );
        assert!(connection.log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_requeues_operations() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            transport.push_network_error("refused");
        }
        let mut connection = connection(transport.clone());

        connection.remote_object("w1").call("focus", None).await.unwrap_err();
        assert_eq!(connection.log().len(), 1);
        assert_eq!(connection.log().open_set_target(), None);

        connection.send().await.unwrap();
        let messages = transport.posted_messages();
        assert_eq!(
            messages.last().unwrap()["operations"],
            json!([["call", "w1", "focus", {}]])
        );
        assert_eq!(connection.stats().snapshot().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_unparseable_answer_requeues_operations() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, "<html>");
        let mut connection = connection(transport);

        connection.remote_object("w1").set("text", "hello").unwrap();
        assert!(matches!(
            connection.send().await,
            Err(ConnectionError::Protocol(_))
        ));
        assert_eq!(connection.log().operations()[0].properties()["text"], "hello");
    }

    #[tokio::test]
    async fn test_malformed_instruction_applies_rest_of_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(json!({
            "head": {"requestCounter": 3},
            "operations": [
                ["create", "w1", "test.Text", {}],
                ["set", "w1", [1, 2]]
            ]
        }));
        let mut connection = connection(transport);

        let report = connection.send().await.unwrap();
        assert!(connection.registry().contains("w1"));
        assert_eq!(report.created, vec!["w1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(
            report.failures[0].error,
            lifecycle::InstructionError::Malformed(_)
        ));
        assert_eq!(connection.request_counter(), Some(&json!(3)));
        assert_eq!(connection.stats().snapshot().instruction_failures, 1);
    }

    #[test]
    fn test_schedule_send_keeps_earliest() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut connection = connection(transport);
        connection.schedule_send(Duration::from_secs(5));
        let first = connection.send_deadline().unwrap();
        connection.schedule_send(Duration::from_secs(10));
        assert_eq!(connection.send_deadline(), Some(first));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = ClientConfig::new("ftp://nope");
        assert!(matches!(
            Connection::new(config, transport, Registry::new()),
            Err(ConnectionError::Config(_))
        ));
    }
}
