// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outgoing operation log.
//!
//! Accumulates `set`, `notify` and `call` operations between flushes.
//! Consecutive `set`s against the same target are coalesced into a single
//! record:
//!
//! ```text
//! append_set(w1, a)   -> [set w1 {a}]            open_set = w1
//! append_set(w1, b)   -> [set w1 {a, b}]         open_set = w1
//! append_call(w1, m)  -> [set w1 {a, b}, call]   open_set = None
//! append_set(w1, c)   -> [.., call, set w1 {c}]  open_set = w1
//! ```

use crate::protocol::{ClientMessage, ClientOperation, ObjectId, Properties};
use serde_json::Value;
use thiserror::Error;

/// Operation log errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("Operation log already disposed")]
    Disposed,
}

/// Ordered log of outgoing operations plus message head.
#[derive(Debug, Default)]
pub struct OperationLog {
    head: Properties,
    operations: Vec<ClientOperation>,
    /// Target of the trailing `set` record that may still absorb properties.
    open_set: Option<ObjectId>,
    disposed: bool,
}

impl OperationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a head entry.
    pub fn append_head(&mut self, key: &str, value: Value) -> Result<(), LogError> {
        self.ensure_live()?;
        self.head.insert(key.to_string(), value);
        Ok(())
    }

    /// Append a property change, merging into the open `set` record when it
    /// targets the same object.
    pub fn append_set(&mut self, target: &str, property: &str, value: Value) -> Result<(), LogError> {
        self.ensure_live()?;

        if self.open_set.as_deref() == Some(target) {
            if let Some(ClientOperation::Set { properties, .. }) = self.operations.last_mut() {
                properties.insert(property.to_string(), value);
                return Ok(());
            }
        }

        let mut properties = Properties::new();
        properties.insert(property.to_string(), value);
        self.operations.push(ClientOperation::Set {
            target: target.to_string(),
            properties,
        });
        self.open_set = Some(target.to_string());
        Ok(())
    }

    /// Append an event notification. Closes the coalescing window.
    pub fn append_notify(
        &mut self,
        target: &str,
        event: &str,
        properties: Properties,
    ) -> Result<(), LogError> {
        self.ensure_live()?;
        self.operations.push(ClientOperation::Notify {
            target: target.to_string(),
            event: event.to_string(),
            properties,
        });
        self.open_set = None;
        Ok(())
    }

    /// Append a method call. Closes the coalescing window.
    pub fn append_call(
        &mut self,
        target: &str,
        method: &str,
        properties: Properties,
    ) -> Result<(), LogError> {
        self.ensure_live()?;
        self.operations.push(ClientOperation::Call {
            target: target.to_string(),
            method: method.to_string(),
            properties,
        });
        self.open_set = None;
        Ok(())
    }

    /// Put back the operations of a message that was never answered, ahead
    /// of anything appended since. When nothing was appended in between, a
    /// trailing `set` stays open for coalescing.
    pub fn requeue(&mut self, operations: Vec<ClientOperation>) -> Result<(), LogError> {
        self.ensure_live()?;
        if operations.is_empty() {
            return Ok(());
        }
        if self.operations.is_empty() {
            self.open_set = match operations.last() {
                Some(ClientOperation::Set { target, .. }) => Some(target.clone()),
                _ => None,
            };
        }
        let newer = std::mem::replace(&mut self.operations, operations);
        self.operations.extend(newer);
        Ok(())
    }

    /// Check whether a flush would carry any operation.
    pub fn has_operations(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Number of operations in the log.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations in append order.
    pub fn operations(&self) -> &[ClientOperation] {
        &self.operations
    }

    /// Message head.
    pub fn head(&self) -> &Properties {
        &self.head
    }

    /// Target whose `set` record is still open for coalescing.
    pub fn open_set_target(&self) -> Option<&str> {
        self.open_set.as_deref()
    }

    /// Build the wire message for the current content.
    pub fn create_message(&self) -> Result<ClientMessage, LogError> {
        self.ensure_live()?;
        Ok(ClientMessage {
            head: self.head.clone(),
            operations: self.operations.clone(),
        })
    }

    /// Release the log. Any further use fails with [`LogError::Disposed`],
    /// including a second `dispose()`.
    pub fn dispose(&mut self) -> Result<(), LogError> {
        self.ensure_live()?;
        self.head = Properties::new();
        self.operations = Vec::new();
        self.open_set = None;
        self.disposed = true;
        Ok(())
    }

    /// Check if the log has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_live(&self) -> Result<(), LogError> {
        if self.disposed {
            Err(LogError::Disposed)
        } else {
            Ok(())
        }
    }
}
