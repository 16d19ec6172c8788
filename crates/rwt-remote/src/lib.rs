// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RWT Remote Object Client
//!
//! Keeps a local mirror of a server-owned object graph in sync over HTTP.
//!
//! # Features
//!
//! - **Operation Log**: Batches outgoing `set`/`notify`/`call` operations,
//!   coalescing consecutive property writes on the same target
//! - **Transport**: JSON POST exchanges with retry and linear backoff
//! - **Server Push**: Long-poll GET channel that wakes the request cycle
//! - **Registry**: Typed handler table driving entity create/set/destroy
//!
//! # Quick Start
//!
//! ```bash
//! # Connect to a session endpoint
//! rwt-remote --url http://localhost:8080/rap
//!
//! # Using config file
//! rwt-remote --config client.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! url = "http://localhost:8080/rap"
//! request_timeout_ms = 30000
//!
//! [retry]
//! base_delay_ms = 1000
//! max_retries = 3
//!
//! [server_push]
//! enabled = true
//! ```

pub mod config;
pub mod connection;
pub mod lifecycle;
pub mod operation_log;
pub mod protocol;
pub mod push;
pub mod registry;
pub mod remote;
pub mod retry;
pub mod session;
pub mod transport;
pub mod widgets;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError, RetryConfig, ServerPushConfig};
pub use connection::{Connection, ConnectionError, ConnectionStats, ConnectionStatsSnapshot};
pub use lifecycle::{apply_batch, apply_instructions, BatchReport, InstructionError, InstructionFailure};
pub use operation_log::{LogError, OperationLog};
pub use protocol::{ClientMessage, ClientOperation, ObjectId, Properties, ServerMessage, ServerOperation};
pub use push::{PushEvent, PushHandle, PushState, PushStateMachine, ServerPush};
pub use registry::{
    DescriptorBuilder, EntityKind, HandlerDescriptor, HandlerError, Mirror, MirrorKey, Registry,
    RegistryError,
};
pub use remote::{NotifyMode, RemoteObject, RemoteObjectHandle, RemoteObjects};
pub use retry::Backoff;
pub use session::{Session, SessionClosed, SessionEvent, SessionHandle, UiCommand};
pub use transport::{
    Exchange, ExchangeError, HttpMethod, HttpRequest, HttpTransport, NetworkError, Request,
    Response, Transport,
};
