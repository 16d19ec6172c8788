// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session event loop.
//!
//! A [`Session`] owns the [`Connection`] and, when enabled, the server push
//! driver. UI code talks to it through a [`SessionHandle`]; results flow back
//! as [`SessionEvent`]s.
//!
//! The loop multiplexes three sources:
//!
//! - UI commands (`set`, `notify`, `call`, `flush`, `shutdown`)
//! - server push wake-ups, each running one request cycle
//! - the deadline of a delayed `notify` send
//!
//! The server switches push on and off through the service object
//! `rwt.client.ServerPush` (property `active`).

use crate::connection::{Connection, ConnectionError, ConnectionStatsSnapshot};
use crate::lifecycle::BatchReport;
use crate::protocol::{ObjectId, Properties};
use crate::push::{PushEvent, PushHandle, PushState, ServerPush};
use crate::registry::value::expect_bool;
use crate::registry::{DescriptorBuilder, HandlerDescriptor, Mirror};
use crate::remote::NotifyMode;
use crate::transport::Transport;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Id and type of the server push service object.
pub const SERVER_PUSH_ID: &str = "rwt.client.ServerPush";
pub const SERVER_PUSH_TYPE: &str = "rwt.client.ServerPush";

const COMMAND_QUEUE: usize = 256;

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    Set {
        target: ObjectId,
        property: String,
        value: Value,
    },
    Notify {
        target: ObjectId,
        event: String,
        properties: Option<Properties>,
        mode: NotifyMode,
    },
    Call {
        target: ObjectId,
        method: String,
        properties: Option<Properties>,
    },
    Flush,
    Shutdown,
}

/// Outcomes reported by a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A request cycle completed and its batch was applied.
    Flushed(BatchReport),
    /// The server rejected a request.
    ServerError { status: u16, message: String },
    /// Connection errors exhausted the retry budget.
    ConnectionFailed { attempts: u32 },
    /// Malformed answer or local misuse.
    ProtocolError(String),
}

impl From<ConnectionError> for SessionEvent {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Server { status, message } => Self::ServerError { status, message },
            ConnectionError::ConnectionFailed { attempts } => Self::ConnectionFailed { attempts },
            other => Self::ProtocolError(other.to_string()),
        }
    }
}

/// The session is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Session closed")]
pub struct SessionClosed;

/// Cloneable command sender for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<UiCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: UiCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }

    pub async fn set(
        &self,
        target: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), SessionClosed> {
        self.send(UiCommand::Set {
            target: target.to_string(),
            property: property.to_string(),
            value: value.into(),
        })
        .await
    }

    pub async fn notify(
        &self,
        target: &str,
        event: &str,
        properties: Option<Properties>,
        mode: NotifyMode,
    ) -> Result<(), SessionClosed> {
        self.send(UiCommand::Notify {
            target: target.to_string(),
            event: event.to_string(),
            properties,
            mode,
        })
        .await
    }

    pub async fn call(
        &self,
        target: &str,
        method: &str,
        properties: Option<Properties>,
    ) -> Result<(), SessionClosed> {
        self.send(UiCommand::Call {
            target: target.to_string(),
            method: method.to_string(),
            properties,
        })
        .await
    }

    pub async fn flush(&self) -> Result<(), SessionClosed> {
        self.send(UiCommand::Flush).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(UiCommand::Shutdown).await
    }
}

/// Mirror of the server push service object.
#[derive(Debug)]
pub struct ServerPushService {
    handle: PushHandle,
}

impl ServerPushService {
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl Mirror for ServerPushService {}

/// Handler table entry for [`ServerPushService`].
pub fn server_push_descriptor() -> HandlerDescriptor {
    DescriptorBuilder::<ServerPushService>::new(SERVER_PUSH_TYPE)
        .property("active", |service, value| {
            let active = expect_bool("active", value)?;
            debug!("Server push {}", if active { "activated" } else { "deactivated" });
            service.handle.set_active(active);
            Ok(())
        })
        .build()
}

/// Connection plus event loop.
pub struct Session<T: Transport> {
    connection: Connection<T>,
    push: Option<PushHandle>,
    push_driver: Option<ServerPush<T>>,
    push_task: Option<JoinHandle<PushState>>,
    push_events: Option<mpsc::UnboundedReceiver<PushEvent>>,
    commands: mpsc::Receiver<UiCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: Transport> Session<T> {
    /// Build a session around `connection`.
    ///
    /// Registers the server push service object when push is enabled.
    pub fn new(
        mut connection: Connection<T>,
    ) -> Result<(Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), ConnectionError> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut push = None;
        let mut push_driver = None;
        let mut push_events = None;
        let config = connection.config().clone();
        if config.server_push.enabled {
            let (push_tx, push_rx) = mpsc::unbounded_channel();
            let (driver, handle) = ServerPush::new(
                connection.transport().clone(),
                config.url.as_str(),
                &config.server_push.service_handler,
                config.connection_id.as_deref(),
                config.retry,
                push_tx,
            );

            let registry = connection.registry_mut();
            if !registry.is_registered(SERVER_PUSH_TYPE) {
                registry.register(server_push_descriptor())?;
            }
            registry.register_service(
                SERVER_PUSH_ID,
                SERVER_PUSH_TYPE,
                Box::new(ServerPushService {
                    handle: handle.clone(),
                }),
            )?;

            push = Some(handle);
            push_driver = Some(driver);
            push_events = Some(push_rx);
        }

        let session = Self {
            connection,
            push,
            push_driver,
            push_task: None,
            push_events,
            commands: command_rx,
            events: event_tx,
        };
        Ok((session, SessionHandle { commands: command_tx }, event_rx))
    }

    /// Send the initial request.
    pub async fn start(&mut self) -> Result<BatchReport, ConnectionError> {
        info!("Starting session with {}", self.connection.config().url);
        self.connection.send().await
    }

    pub fn connection(&self) -> &Connection<T> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection<T> {
        &mut self.connection
    }

    pub fn push_handle(&self) -> Option<&PushHandle> {
        self.push.as_ref()
    }

    /// Run until [`UiCommand::Shutdown`] or until every handle is dropped.
    pub async fn run(mut self) -> ConnectionStatsSnapshot {
        if let Some(driver) = self.push_driver.take() {
            self.push_task = Some(tokio::spawn(driver.run()));
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(UiCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = next_push_event(&mut self.push_events) => match event {
                    Some(event) => self.handle_push(event).await,
                    None => self.push_events = None,
                },
                _ = sleep_until(self.connection.send_deadline()) => {
                    let outcome = self.connection.flush().await;
                    self.report(outcome);
                }
            }
        }

        if let Some(task) = self.push_task.take() {
            task.abort();
        }
        self.connection.registry_mut().clear();
        let stats = self.connection.stats().snapshot();
        info!(
            "Session closed: {} messages, {} operations sent",
            stats.messages_sent, stats.operations_sent
        );
        stats
    }

    async fn handle_command(&mut self, command: UiCommand) {
        let outcome = match command {
            UiCommand::Set {
                target,
                property,
                value,
            } => self
                .connection
                .remote_object(&target)
                .set(&property, value)
                .map(|()| None),
            UiCommand::Notify {
                target,
                event,
                properties,
                mode,
            } => {
                self.connection
                    .remote_object(&target)
                    .notify(&event, properties, mode)
                    .await
            }
            UiCommand::Call {
                target,
                method,
                properties,
            } => self
                .connection
                .remote_object(&target)
                .call(&method, properties)
                .await
                .map(Some),
            UiCommand::Flush => self.connection.flush().await,
            UiCommand::Shutdown => Ok(None),
        };
        self.report(outcome);
    }

    async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Wake => {
                let outcome = self.connection.send().await.map(Some);
                self.report(outcome);
                if let Some(push) = &self.push {
                    push.resume();
                }
            }
            PushEvent::ServerError { status, message } => {
                self.emit(SessionEvent::ServerError { status, message });
            }
            PushEvent::ConnectionFailed { attempts } => {
                self.emit(SessionEvent::ConnectionFailed { attempts });
            }
        }
    }

    fn report(&self, outcome: Result<Option<BatchReport>, ConnectionError>) {
        match outcome {
            Ok(Some(report)) => self.emit(SessionEvent::Flushed(report)),
            Ok(None) => {}
            Err(err) => {
                warn!("Request cycle failed: {}", err);
                self.emit(err.into());
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No session event listener");
        }
    }
}

async fn next_push_event(events: &mut Option<mpsc::UnboundedReceiver<PushEvent>>) -> Option<PushEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
