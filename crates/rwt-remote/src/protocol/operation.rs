// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol operations.
//!
//! Operations travel as positional JSON arrays whose first element names the
//! action:
//!
//! ```text
//! ["set", "w3", {"text": "hello"}]
//! ["notify", "w3", "Selection", {}]
//! ["call", "w3", "focus", {}]
//! ["create", "w3", "rwt.widgets.Button", {"parent": "w2"}]
//! ["listen", "w3", {"Selection": true}]
//! ["destroy", "w3"]
//! ```

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Property map carried by operations.
pub type Properties = serde_json::Map<String, Value>;

/// Identifier of a remote object.
pub type ObjectId = String;

/// Client -> Server operation (outgoing log entry).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOperation {
    /// Property changes, coalesced per target.
    Set {
        target: ObjectId,
        properties: Properties,
    },

    /// Event notification.
    Notify {
        target: ObjectId,
        event: String,
        properties: Properties,
    },

    /// Remote method invocation.
    Call {
        target: ObjectId,
        method: String,
        properties: Properties,
    },
}

impl ClientOperation {
    /// Target object of this operation.
    pub fn target(&self) -> &str {
        match self {
            Self::Set { target, .. } | Self::Notify { target, .. } | Self::Call { target, .. } => {
                target
            }
        }
    }

    /// Wire action name.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Notify { .. } => "notify",
            Self::Call { .. } => "call",
        }
    }

    /// Properties carried by this operation.
    pub fn properties(&self) -> &Properties {
        match self {
            Self::Set { properties, .. }
            | Self::Notify { properties, .. }
            | Self::Call { properties, .. } => properties,
        }
    }
}

/// Server -> Client instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerOperation {
    /// Create a mirror of the given type.
    Create {
        target: ObjectId,
        type_name: String,
        properties: Properties,
    },

    /// Apply property deltas to an existing mirror.
    Set {
        target: ObjectId,
        properties: Properties,
    },

    /// Update which events the server listens to.
    Listen {
        target: ObjectId,
        listeners: BTreeMap<String, bool>,
    },

    /// Invoke a method handler.
    Call {
        target: ObjectId,
        method: String,
        properties: Properties,
    },

    /// Notification acknowledgement (no local effect).
    Notify {
        target: ObjectId,
        event: String,
        properties: Properties,
    },

    /// Destroy a mirror and its destroyable children.
    Destroy { target: ObjectId },
}

impl ServerOperation {
    /// Target object of this instruction.
    pub fn target(&self) -> &str {
        match self {
            Self::Create { target, .. }
            | Self::Set { target, .. }
            | Self::Listen { target, .. }
            | Self::Call { target, .. }
            | Self::Notify { target, .. }
            | Self::Destroy { target } => target,
        }
    }

    /// Wire action name.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Set { .. } => "set",
            Self::Listen { .. } => "listen",
            Self::Call { .. } => "call",
            Self::Notify { .. } => "notify",
            Self::Destroy { .. } => "destroy",
        }
    }
}

// ============================================================================
// Serialization
// ============================================================================

impl Serialize for ClientOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Set { target, properties } => ("set", target, properties).serialize(serializer),
            Self::Notify {
                target,
                event,
                properties,
            } => ("notify", target, event, properties).serialize(serializer),
            Self::Call {
                target,
                method,
                properties,
            } => ("call", target, method, properties).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ClientOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<Value>::deserialize(deserializer)?;
        Self::from_parts(parts).map_err(de::Error::custom)
    }
}

impl ClientOperation {
    fn from_parts(parts: Vec<Value>) -> Result<Self, String> {
        let mut fields = Fields::new(parts)?;
        let action = fields.action.clone();
        let op = match action.as_str() {
            "set" => Self::Set {
                target: fields.string("target")?,
                properties: fields.properties()?,
            },
            "notify" => Self::Notify {
                target: fields.string("target")?,
                event: fields.string("event")?,
                properties: fields.properties()?,
            },
            "call" => Self::Call {
                target: fields.string("target")?,
                method: fields.string("method")?,
                properties: fields.properties()?,
            },
            other => return Err(format!("unknown client operation '{}'", other)),
        };
        Ok(op)
    }
}

impl Serialize for ServerOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Create {
                target,
                type_name,
                properties,
            } => ("create", target, type_name, properties).serialize(serializer),
            Self::Set { target, properties } => ("set", target, properties).serialize(serializer),
            Self::Listen { target, listeners } => {
                ("listen", target, listeners).serialize(serializer)
            }
            Self::Call {
                target,
                method,
                properties,
            } => ("call", target, method, properties).serialize(serializer),
            Self::Notify {
                target,
                event,
                properties,
            } => ("notify", target, event, properties).serialize(serializer),
            Self::Destroy { target } => ("destroy", target).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ServerOperation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let parts = Vec::<Value>::deserialize(deserializer)?;
        Self::from_parts(parts).map_err(de::Error::custom)
    }
}

impl ServerOperation {
    /// Parse one instruction from its wire array.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Array(parts) => Self::from_parts(parts.clone()),
            other => Err(format!("instruction must be an array, got {}", other)),
        }
    }

    fn from_parts(parts: Vec<Value>) -> Result<Self, String> {
        let mut fields = Fields::new(parts)?;
        let action = fields.action.clone();
        let op = match action.as_str() {
            "create" => Self::Create {
                target: fields.string("target")?,
                type_name: fields.string("type")?,
                properties: fields.properties()?,
            },
            "set" => Self::Set {
                target: fields.string("target")?,
                properties: fields.properties()?,
            },
            "listen" => {
                let target = fields.string("target")?;
                let listeners = serde_json::from_value(Value::Object(fields.properties()?))
                    .map_err(|e| format!("invalid listen map: {}", e))?;
                Self::Listen { target, listeners }
            }
            "call" => Self::Call {
                target: fields.string("target")?,
                method: fields.string("method")?,
                properties: fields.properties()?,
            },
            "notify" => Self::Notify {
                target: fields.string("target")?,
                event: fields.string("event")?,
                properties: fields.properties()?,
            },
            "destroy" => Self::Destroy {
                target: fields.string("target")?,
            },
            other => return Err(format!("unknown server operation '{}'", other)),
        };
        Ok(op)
    }
}

/// Positional field cursor over an operation array.
struct Fields {
    action: String,
    rest: std::vec::IntoIter<Value>,
}

impl Fields {
    fn new(parts: Vec<Value>) -> Result<Self, String> {
        let mut rest = parts.into_iter();
        match rest.next() {
            Some(Value::String(action)) => Ok(Self { action, rest }),
            Some(other) => Err(format!("operation action must be a string, got {}", other)),
            None => Err("empty operation".to_string()),
        }
    }

    fn string(&mut self, what: &str) -> Result<String, String> {
        match self.rest.next() {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(format!(
                "'{}' {}: expected string, got {}",
                self.action, what, other
            )),
            None => Err(format!("'{}' is missing {}", self.action, what)),
        }
    }

    /// Missing or `null` property maps read as `{}`.
    fn properties(&mut self) -> Result<Properties, String> {
        match self.rest.next() {
            None | Some(Value::Null) => Ok(Properties::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(other) => Err(format!(
                "'{}' properties: expected object, got {}",
                self.action, other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_client_operations_as_arrays() {
        let mut properties = Properties::new();
        properties.insert("text".into(), json!("hello"));
        let set = ClientOperation::Set {
            target: "w3".into(),
            properties,
        };
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            json!(["set", "w3", {"text": "hello"}])
        );

        let notify = ClientOperation::Notify {
            target: "w3".into(),
            event: "Selection".into(),
            properties: Properties::new(),
        };
        assert_eq!(
            serde_json::to_value(&notify).unwrap(),
            json!(["notify", "w3", "Selection", {}])
        );
    }

    #[test]
    fn test_parse_server_create_and_destroy() {
        let op: ServerOperation =
            serde_json::from_value(json!(["create", "w4", "rwt.widgets.Label", {"parent": "w2"}]))
                .unwrap();
        match op {
            ServerOperation::Create {
                target,
                type_name,
                properties,
            } => {
                assert_eq!(target, "w4");
                assert_eq!(type_name, "rwt.widgets.Label");
                assert_eq!(properties["parent"], "w2");
            }
            other => panic!("Expected Create, got {:?}", other),
        }

        let op: ServerOperation = serde_json::from_value(json!(["destroy", "w4"])).unwrap();
        assert_eq!(op.action(), "destroy");
        assert_eq!(op.target(), "w4");
    }

    #[test]
    fn test_parse_listen_map() {
        let op: ServerOperation =
            serde_json::from_value(json!(["listen", "w3", {"Selection": true, "Modify": false}]))
                .unwrap();
        match op {
            ServerOperation::Listen { listeners, .. } => {
                assert_eq!(listeners.get("Selection"), Some(&true));
                assert_eq!(listeners.get("Modify"), Some(&false));
            }
            other => panic!("Expected Listen, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_properties_default_to_empty() {
        let op: ServerOperation = serde_json::from_value(json!(["call", "w3", "focus"])).unwrap();
        match op {
            ServerOperation::Call { properties, .. } => assert!(properties.is_empty()),
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_malformed_operations() {
        assert!(serde_json::from_value::<ServerOperation>(json!([])).is_err());
        assert!(serde_json::from_value::<ServerOperation>(json!(["explode", "w1"])).is_err());
        assert!(serde_json::from_value::<ServerOperation>(json!(["set", 42, {}])).is_err());
        assert!(serde_json::from_value::<ServerOperation>(json!(["set", "w1", [1, 2]])).is_err());
        assert!(serde_json::from_value::<ClientOperation>(json!(["destroy", "w1"])).is_err());
    }

    #[test]
    fn test_from_value_reports_shape_errors() {
        let op = ServerOperation::from_value(&json!(["set", "w1", {"text": "x"}])).unwrap();
        assert_eq!(op.target(), "w1");

        let err = ServerOperation::from_value(&json!(["set", "w1", [1, 2]])).unwrap_err();
        assert!(err.contains("expected object"), "{}", err);
        assert!(ServerOperation::from_value(&json!({"set": "w1"})).is_err());
    }
}
