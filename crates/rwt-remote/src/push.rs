// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server push channel.
//!
//! A long-lived GET request that the server answers when it has updates the
//! client did not ask for. Each answer wakes the session, which runs the
//! ordinary request cycle and then resumes the push channel.
//!
//! # State Machine
//!
//! ```text
//!      +----------+  set_active(true)  +----------------+
//!      |   Idle   |------------------->| WaitingForPush |<------------+
//!      +----------+<-------------------+-------+--------+             |
//!                    set_active(false)         | try_begin()          |
//!                                              v                      |
//!                                      +----------------+  success    |
//!                                      |  PushInFlight  |-------------+
//!                                      +---+--------+---+             |
//!                      connection error    |        | server error    |
//!                                          v        v                 |
//!                                 +----------+  +--------------+      |
//!                                 | Retrying |  | ServerFailed |      |
//!                                 +----+-----+  +--------------+      |
//!                   cap reached        |  delay elapsed               |
//!                        v             +------------------------------+
//!                +------------------+
//!                | ConnectionFailed |
//!                +------------------+
//! ```

use crate::config::RetryConfig;
use crate::retry::Backoff;
use crate::transport::{HttpMethod, Request, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

// ============================================================================
// Push State
// ============================================================================

/// Server push states.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PushState {
    /// Push disabled by the server or the session
    #[default]
    Idle,

    /// Active, no request in flight
    WaitingForPush,

    /// Push request outstanding
    PushInFlight,

    /// Waiting out the backoff delay after a connection error
    Retrying,

    /// Retry cap reached (terminal state)
    ConnectionFailed,

    /// Server answered with an error (terminal state)
    ServerFailed,
}

impl PushState {
    /// Check if the channel has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PushState::ConnectionFailed | PushState::ServerFailed)
    }
}

impl std::fmt::Display for PushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PushState::Idle => "Idle",
            PushState::WaitingForPush => "WaitingForPush",
            PushState::PushInFlight => "PushInFlight",
            PushState::Retrying => "Retrying",
            PushState::ConnectionFailed => "ConnectionFailed",
            PushState::ServerFailed => "ServerFailed",
        };
        write!(f, "{}", s)
    }
}

/// What to do after a connection error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushAction {
    /// Try again after the delay.
    Retry(Duration),
    /// Give up; the failure must be surfaced.
    Fail,
}

/// Transition logic of the push channel, free of any I/O.
#[derive(Debug, Clone)]
pub struct PushStateMachine {
    active: bool,
    running: bool,
    backoff: Backoff,
    state: PushState,
}

impl PushStateMachine {
    /// Create an inactive machine.
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            active: false,
            running: false,
            backoff: Backoff::new(retry),
            state: PushState::Idle,
        }
    }

    /// Enable or disable push. Never aborts a request already in flight.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        match self.state {
            PushState::Idle if active => self.state = PushState::WaitingForPush,
            PushState::WaitingForPush if !active => self.state = PushState::Idle,
            _ => {}
        }
    }

    /// Start a push attempt if `active && !running` and nothing else blocks it.
    pub fn try_begin(&mut self) -> bool {
        if !self.active || self.running || self.state != PushState::WaitingForPush {
            return false;
        }
        self.running = true;
        self.state = PushState::PushInFlight;
        true
    }

    /// The push request completed with HTTP 200.
    pub fn on_success(&mut self) {
        self.running = false;
        self.backoff.reset();
        self.state = self.resting_state();
    }

    /// The push request failed at the network level.
    pub fn on_connection_error(&mut self) -> PushAction {
        self.running = false;
        match self.backoff.next_retry() {
            Some(delay) => {
                self.state = PushState::Retrying;
                PushAction::Retry(delay)
            }
            None => {
                self.state = PushState::ConnectionFailed;
                PushAction::Fail
            }
        }
    }

    /// The backoff delay has elapsed.
    pub fn on_retry_elapsed(&mut self) {
        if self.state == PushState::Retrying {
            self.state = self.resting_state();
        }
    }

    /// The server answered with a non-200 status.
    pub fn on_server_error(&mut self) {
        self.running = false;
        self.state = PushState::ServerFailed;
    }

    pub fn state(&self) -> PushState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Consecutive retries since the last success.
    pub fn retry_count(&self) -> u32 {
        self.backoff.retry_count()
    }

    fn resting_state(&self) -> PushState {
        if self.active {
            PushState::WaitingForPush
        } else {
            PushState::Idle
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Notifications from the push driver to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// The server has pending updates; run the request cycle.
    Wake,
    /// The server rejected the push request.
    ServerError { status: u16, message: String },
    /// Connection errors exhausted the retry budget.
    ConnectionFailed { attempts: u32 },
}

#[derive(Debug, Default)]
struct PushShared {
    active: AtomicBool,
    /// Signalled on activation.
    wake: Notify,
    /// Signalled when the session finished the cycle a wake-up started.
    resume: Notify,
}

/// Cloneable control handle for a running [`ServerPush`].
#[derive(Debug, Clone)]
pub struct PushHandle {
    shared: Arc<PushShared>,
}

impl PushHandle {
    /// Enable or disable push requests.
    pub fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::SeqCst);
        if active {
            self.shared.wake.notify_one();
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Let the driver issue its next push request.
    pub fn resume(&self) {
        self.shared.resume.notify_one();
    }
}

/// Async driver issuing push requests over a [`Transport`].
pub struct ServerPush<T: Transport> {
    transport: Arc<T>,
    url: String,
    query: String,
    machine: PushStateMachine,
    shared: Arc<PushShared>,
    events: mpsc::UnboundedSender<PushEvent>,
}

impl<T: Transport> ServerPush<T> {
    /// Create a driver and its control handle. The driver starts inactive.
    pub fn new(
        transport: Arc<T>,
        url: impl Into<String>,
        service_handler: &str,
        connection_id: Option<&str>,
        retry: RetryConfig,
        events: mpsc::UnboundedSender<PushEvent>,
    ) -> (Self, PushHandle) {
        let shared = Arc::new(PushShared::default());
        let push = Self {
            transport,
            url: url.into(),
            query: push_query(service_handler, connection_id),
            machine: PushStateMachine::new(retry),
            shared: shared.clone(),
            events,
        };
        (push, PushHandle { shared })
    }

    /// Drive the channel until a terminal state is reached or the session
    /// side of the event channel goes away.
    pub async fn run(mut self) -> PushState {
        loop {
            self.machine
                .set_active(self.shared.active.load(Ordering::SeqCst));
            if !self.machine.try_begin() {
                if self.machine.state().is_terminal() {
                    return self.machine.state();
                }
                self.shared.wake.notified().await;
                continue;
            }

            let completion = Request::new(self.transport.clone(), &self.url)
                .with_method(HttpMethod::Get)
                .with_data(&self.query)
                .send_sync()
                .await;

            match completion {
                Ok(_) => {
                    self.machine.on_success();
                    debug!("Server push wake-up");
                    if self.events.send(PushEvent::Wake).is_err() {
                        return self.machine.state();
                    }
                    self.shared.resume.notified().await;
                }
                Err(e) if e.is_connection_error() => match self.machine.on_connection_error() {
                    PushAction::Retry(delay) => {
                        warn!(
                            "Server push failed ({}), retry {} in {:?}",
                            e,
                            self.machine.retry_count(),
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        self.machine.on_retry_elapsed();
                    }
                    PushAction::Fail => {
                        let attempts = self.machine.retry_count() + 1;
                        error!("Server push gave up after {} attempts: {}", attempts, e);
                        let _ = self.events.send(PushEvent::ConnectionFailed { attempts });
                        return self.machine.state();
                    }
                },
                Err(e) => {
                    self.machine.on_server_error();
                    error!("Server push rejected: {}", e);
                    let _ = self.events.send(PushEvent::ServerError {
                        status: e.status(),
                        message: e.to_string(),
                    });
                    return self.machine.state();
                }
            }
        }
    }
}

fn push_query(service_handler: &str, connection_id: Option<&str>) -> String {
    match connection_id {
        Some(cid) => format!("servicehandler={}&cid={}", service_handler, cid),
        None => format!("servicehandler={}", service_handler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;

    fn retry() -> RetryConfig {
        RetryConfig::new(Duration::from_millis(100), 3)
    }

    #[test]
    fn test_inactive_never_begins() {
        let mut machine = PushStateMachine::new(retry());
        assert!(!machine.try_begin());
        assert_eq!(machine.state(), PushState::Idle);

        machine.set_active(true);
        assert_eq!(machine.state(), PushState::WaitingForPush);
        assert!(machine.try_begin());
    }

    #[test]
    fn test_running_guards_duplicate_push() {
        let mut machine = PushStateMachine::new(retry());
        machine.set_active(true);
        assert!(machine.try_begin());
        assert!(machine.is_running());
        assert!(!machine.try_begin());
    }

    #[test]
    fn test_deactivate_keeps_request_in_flight() {
        let mut machine = PushStateMachine::new(retry());
        machine.set_active(true);
        machine.try_begin();
        machine.set_active(false);

        assert_eq!(machine.state(), PushState::PushInFlight);
        machine.on_success();
        assert_eq!(machine.state(), PushState::Idle);
        assert!(!machine.try_begin());
    }

    #[test]
    fn test_retry_cap() {
        let mut machine = PushStateMachine::new(retry());
        machine.set_active(true);

        let mut delays = Vec::new();
        loop {
            assert!(machine.try_begin());
            match machine.on_connection_error() {
                PushAction::Retry(delay) => {
                    delays.push(delay);
                    machine.on_retry_elapsed();
                }
                PushAction::Fail => break,
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
        assert_eq!(machine.state(), PushState::ConnectionFailed);
        assert!(machine.state().is_terminal());
        assert!(!machine.try_begin());
    }

    #[test]
    fn test_success_resets_retries() {
        let mut machine = PushStateMachine::new(retry());
        machine.set_active(true);
        for _ in 0..2 {
            machine.try_begin();
            machine.on_connection_error();
            machine.on_retry_elapsed();
        }
        assert_eq!(machine.retry_count(), 2);

        machine.try_begin();
        machine.on_success();
        assert_eq!(machine.retry_count(), 0);
        assert_eq!(machine.state(), PushState::WaitingForPush);
    }

    #[test]
    fn test_server_error_is_terminal() {
        let mut machine = PushStateMachine::new(retry());
        machine.set_active(true);
        machine.try_begin();
        machine.on_server_error();
        assert_eq!(machine.state(), PushState::ServerFailed);
        assert_eq!(machine.retry_count(), 0);
    }

    #[test]
    fn test_push_query() {
        assert_eq!(push_query("org.eclipse.rap.serverpush", None), "servicehandler=org.eclipse.rap.serverpush");
        assert_eq!(push_query("push", Some("7")), "servicehandler=push&cid=7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_retries_with_linear_delay_then_fails() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.script_push_error("connection refused");
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (push, handle) =
            ServerPush::new(transport.clone(), "http://host/rap", "push", None, retry(), tx);
        handle.set_active(true);

        let start = tokio::time::Instant::now();
        let state = push.run().await;

        assert_eq!(state, PushState::ConnectionFailed);
        assert_eq!(rx.recv().await, Some(PushEvent::ConnectionFailed { attempts: 4 }));

        let times = transport.request_times(HttpMethod::Get);
        assert_eq!(times.len(), 4);
        let offsets: Vec<_> = times.iter().map(|t| *t - start).collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(600)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_wakes_and_waits_for_resume() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script_push(200);
        transport.script_push(200);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (push, handle) =
            ServerPush::new(transport.clone(), "http://host/rap", "push", Some("3"), retry(), tx);
        handle.set_active(true);
        let task = tokio::spawn(push.run());

        assert_eq!(rx.recv().await, Some(PushEvent::Wake));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.push_count(), 1);

        handle.resume();
        assert_eq!(rx.recv().await, Some(PushEvent::Wake));
        assert_eq!(transport.push_count(), 2);
        assert_eq!(
            transport.requests()[0].url,
            "http://host/rap?servicehandler=push&cid=3"
        );

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_idle_until_activated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script_push(200);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (push, handle) =
            ServerPush::new(transport.clone(), "http://host/rap", "push", None, retry(), tx);
        let task = tokio::spawn(push.run());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.push_count(), 0);

        handle.set_active(true);
        assert_eq!(rx.recv().await, Some(PushEvent::Wake));
        assert_eq!(transport.push_count(), 1);

        task.abort();
    }
}
