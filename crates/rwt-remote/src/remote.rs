// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remote object proxies.
//!
//! Each entity gets one [`RemoteObjectHandle`] (id + listen set), cached in
//! [`RemoteObjects`] for the entity's lifetime. A [`RemoteObject`] is the
//! short-lived write view over that handle and the owning connection.

use crate::connection::{Connection, ConnectionError};
use crate::lifecycle::BatchReport;
use crate::protocol::{ObjectId, Properties};
use crate::transport::Transport;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::trace;

/// Per-entity write capability: the id and the events the server listens to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObjectHandle {
    id: ObjectId,
    listen_set: HashSet<String>,
}

impl RemoteObjectHandle {
    pub fn new(id: impl Into<ObjectId>) -> Self {
        Self {
            id: id.into(),
            listen_set: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_listening(&self, event: &str) -> bool {
        self.listen_set.contains(event)
    }

    /// Add or remove `event` from the listen set.
    pub fn listen(&mut self, event: &str, listen: bool) {
        if listen {
            self.listen_set.insert(event.to_string());
        } else {
            self.listen_set.remove(event);
        }
    }
}

/// Cache of handles, one per entity.
#[derive(Debug, Default)]
pub struct RemoteObjects {
    handles: HashMap<ObjectId, RemoteObjectHandle>,
}

impl RemoteObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `id`, created on first use.
    pub fn get_or_create(&mut self, id: &str) -> &mut RemoteObjectHandle {
        self.handles
            .entry(id.to_string())
            .or_insert_with(|| RemoteObjectHandle::new(id))
    }

    pub fn get(&self, id: &str) -> Option<&RemoteObjectHandle> {
        self.handles.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<RemoteObjectHandle> {
        self.handles.remove(id)
    }

    /// Keep only handles whose id satisfies `keep`.
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.handles.retain(|id, _| keep(id));
    }

    pub fn is_listening(&self, id: &str, event: &str) -> bool {
        self.handles
            .get(id)
            .is_some_and(|handle| handle.is_listening(event))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// When a permitted `notify` is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Send right away.
    #[default]
    Immediate,
    /// Send once the delay has elapsed (earlier if something else flushes).
    Delayed(Duration),
    /// Only append; the next flush carries it.
    Suppressed,
}

/// Write view over one remote entity.
pub struct RemoteObject<'a, T: Transport> {
    connection: &'a mut Connection<T>,
    id: ObjectId,
}

impl<'a, T: Transport> RemoteObject<'a, T> {
    pub(crate) fn new(connection: &'a mut Connection<T>, id: &str) -> Self {
        connection.remote_objects_mut().get_or_create(id);
        Self {
            connection,
            id: id.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a property change. Never sends.
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> Result<(), ConnectionError> {
        self.connection
            .log_mut()
            .append_set(&self.id, property, value.into())?;
        Ok(())
    }

    /// Notify the server of `event`, if it listens to it.
    ///
    /// Returns `Ok(None)` without touching the log when the server does not
    /// listen, and when the send is delayed or suppressed.
    pub async fn notify(
        &mut self,
        event: &str,
        properties: Option<Properties>,
        mode: NotifyMode,
    ) -> Result<Option<BatchReport>, ConnectionError> {
        if !self.is_listening(event) {
            trace!("Dropping {} on {}: server not listening", event, self.id);
            return Ok(None);
        }
        self.connection
            .log_mut()
            .append_notify(&self.id, event, properties.unwrap_or_default())?;

        match mode {
            NotifyMode::Immediate => self.connection.send().await.map(Some),
            NotifyMode::Delayed(delay) => {
                self.connection.schedule_send(delay);
                Ok(None)
            }
            NotifyMode::Suppressed => Ok(None),
        }
    }

    /// Invoke `method` on the server. Always sends immediately.
    pub async fn call(
        &mut self,
        method: &str,
        properties: Option<Properties>,
    ) -> Result<BatchReport, ConnectionError> {
        self.connection
            .log_mut()
            .append_call(&self.id, method, properties.unwrap_or_default())?;
        self.connection.send().await
    }

    pub fn is_listening(&self, event: &str) -> bool {
        self.connection.remote_objects().is_listening(&self.id, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::registry::Registry;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn connection() -> (Connection<ScriptedTransport>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let config = ClientConfig::new("http://host/rap").without_server_push();
        let connection = Connection::new(config, transport.clone(), Registry::new()).unwrap();
        (connection, transport)
    }

    #[test]
    fn test_handle_listen_set() {
        let mut handle = RemoteObjectHandle::new("w1");
        assert!(!handle.is_listening("Selection"));
        handle.listen("Selection", true);
        assert!(handle.is_listening("Selection"));
        handle.listen("Selection", false);
        assert!(!handle.is_listening("Selection"));
    }

    #[test]
    fn test_handles_are_cached() {
        let mut objects = RemoteObjects::new();
        objects.get_or_create("w1").listen("Selection", true);
        assert!(objects.get_or_create("w1").is_listening("Selection"));
        assert_eq!(objects.len(), 1);
        assert!(objects.remove("w1").is_some());
        assert!(objects.get("w1").is_none());
    }

    #[tokio::test]
    async fn test_set_does_not_send() {
        let (mut connection, transport) = connection();
        let mut remote = connection.remote_object("w1");
        remote.set("text", "a").unwrap();
        remote.set("enabled", false).unwrap();

        assert!(transport.requests().is_empty());
        assert_eq!(connection.log().len(), 1);
    }

    #[tokio::test]
    async fn test_notify_without_listener_is_noop() {
        let (mut connection, transport) = connection();
        let mut remote = connection.remote_object("w1");
        assert!(!remote.is_listening("Selection"));

        let result = remote.notify("Selection", None, NotifyMode::Immediate).await;
        assert_eq!(result.unwrap(), None);
        assert!(connection.log().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_notify_sends_empty_properties() {
        let (mut connection, transport) = connection();
        connection
            .remote_objects_mut()
            .get_or_create("w1")
            .listen("Selection", true);

        let mut remote = connection.remote_object("w1");
        assert!(remote.is_listening("Selection"));
        let report = remote
            .notify("Selection", None, NotifyMode::Immediate)
            .await
            .unwrap();
        assert!(report.is_some());

        let messages = transport.posted_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0]["operations"],
            json!([["notify", "w1", "Selection", {}]])
        );
    }

    #[tokio::test]
    async fn test_notify_modes() {
        let (mut connection, transport) = connection();
        connection
            .remote_objects_mut()
            .get_or_create("w1")
            .listen("Selection", true);

        let mut remote = connection.remote_object("w1");
        let suppressed = remote
            .notify("Selection", None, NotifyMode::Suppressed)
            .await
            .unwrap();
        assert_eq!(suppressed, None);

        let delayed = remote
            .notify("Selection", None, NotifyMode::Delayed(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(delayed, None);

        assert!(transport.requests().is_empty());
        assert_eq!(connection.log().len(), 2);
        assert!(connection.send_deadline().is_some());
    }

    #[tokio::test]
    async fn test_call_always_sends() {
        let (mut connection, transport) = connection();
        let mut remote = connection.remote_object("w1");
        remote.set("text", "hello").unwrap();
        remote.call("focus", None).await.unwrap();

        let messages = transport.posted_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0]["operations"],
            json!([["set", "w1", {"text": "hello"}], ["call", "w1", "focus", {}]])
        );
        assert!(connection.log().is_empty());
    }
}
