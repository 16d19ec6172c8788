// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol messages.
//!
//! A message pairs a head (session metadata) with an ordered list of
//! operations:
//!
//! ```json
//! {
//!   "head": { "requestCounter": 3 },
//!   "operations": [ ["set", "w3", { "text": "hello" }] ]
//! }
//! ```

use super::operation::{ClientOperation, Properties};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Head key carrying the request sequence number.
pub const HEAD_REQUEST_COUNTER: &str = "requestCounter";

/// Head key carrying the connection identifier.
pub const HEAD_CONNECTION_ID: &str = "connectionId";

/// Head key the server uses to report an application error.
pub const HEAD_ERROR: &str = "error";

/// Client -> Server message (one flush of the operation log).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Session metadata.
    #[serde(default)]
    pub head: Properties,

    /// Operations in log-append order.
    #[serde(default)]
    pub operations: Vec<ClientOperation>,
}

impl ClientMessage {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Server -> Client message (one instruction batch).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Session metadata.
    #[serde(default)]
    pub head: Properties,

    /// Raw instructions, parsed one by one when the batch is applied.
    #[serde(default)]
    pub operations: Vec<Value>,
}

impl ServerMessage {
    /// Parse the JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Request counter announced by the server, if any.
    pub fn request_counter(&self) -> Option<&Value> {
        self.head.get(HEAD_REQUEST_COUNTER)
    }

    /// Application error reported in the head, if any.
    pub fn error(&self) -> Option<&str> {
        self.head.get(HEAD_ERROR).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_client_message() {
        let mut head = Properties::new();
        head.insert(HEAD_REQUEST_COUNTER.into(), json!(7));
        let msg = ClientMessage {
            head,
            operations: vec![ClientOperation::Call {
                target: "w3".into(),
                method: "focus".into(),
                properties: Properties::new(),
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"head": {"requestCounter": 7}, "operations": [["call", "w3", "focus", {}]]})
        );
    }

    #[test]
    fn test_parse_server_message_head() {
        let msg = ServerMessage::from_json(
            r#"{"head": {"requestCounter": 12}, "operations": [["set", "w1", {"text": "x"}]]}"#,
        )
        .unwrap();
        assert_eq!(msg.request_counter(), Some(&json!(12)));
        assert_eq!(msg.error(), None);
        assert_eq!(msg.operations.len(), 1);
    }

    #[test]
    fn test_parse_server_error_head() {
        let msg = ServerMessage::from_json(r#"{"head": {"error": "session timeout"}}"#).unwrap();
        assert_eq!(msg.error(), Some("session timeout"));
        assert!(msg.operations.is_empty());
    }

    #[test]
    fn test_malformed_instruction_does_not_fail_parse() {
        let msg = ServerMessage::from_json(
            r#"{"operations": [["create", "w1", "rwt.widgets.Composite", {}], ["set", "w1", [1, 2]]]}"#,
        )
        .unwrap();
        assert_eq!(msg.operations.len(), 2);
    }
}
