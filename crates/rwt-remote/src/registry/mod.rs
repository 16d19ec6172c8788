// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object registry and handler table.
//!
//! The [`Registry`] owns every local mirror. Each entry is reachable both by
//! its protocol id and by a stable [`MirrorKey`] (the reverse index), and
//! carries the ids of its destroyable children.
//!
//! # Lifecycle
//!
//! ```text
//! create(kind, id, payload)
//!   factory(payload, ctx)     ctx.link_parent(..) records the child relation
//!   insert id <-> key
//!   apply payload properties  in declared order
//!
//! destroy(id)
//!   destroy(child) ...        children first, recursively
//!   destructor(mirror)
//!   remove id <-> key
//! ```

mod capability;
mod descriptor;
pub mod value;

pub use capability::{Bounds, HasBounds, HasEnablement, HasToolTip, HasVisibility};
pub use descriptor::{DescriptorBuilder, EntityKind, HandlerDescriptor};

use crate::protocol::{ObjectId, Properties};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by handlers while operating on a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Invalid value for '{property}': expected {expected}, got {found}")]
    InvalidValue {
        property: String,
        expected: &'static str,
        found: String,
    },

    #[error("No handler or default assignment for property '{0}'")]
    NoDefaultAssignment(String),

    #[error("Mirror is not a {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Parent '{0}' is not registered")]
    UnknownParent(String),

    #[error("{0}")]
    Failed(String),
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Type '{0}' already registered")]
    DuplicateType(String),

    #[error("Type '{0}' has no factory")]
    NotCreatable(String),

    #[error("Unknown object '{0}'")]
    UnknownObject(String),

    #[error("Object '{0}' already exists")]
    DuplicateObject(String),

    #[error("Unknown method '{method}' on {kind}")]
    UnknownMethod { kind: String, method: String },

    #[error("Unknown event '{event}' on {kind}")]
    UnknownEvent { kind: String, event: String },

    #[error("Handler failed on '{id}': {source}")]
    Handler {
        id: ObjectId,
        #[source]
        source: HandlerError,
    },
}

/// Erased access to a mirror's concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Local mirror of a server-owned entity.
pub trait Mirror: AsAny + Send + 'static {
    /// Generic assignment used for declared properties without a handler.
    fn assign(&mut self, property: &str, _value: &Value) -> Result<(), HandlerError> {
        Err(HandlerError::NoDefaultAssignment(property.to_string()))
    }
}

/// Stable identity of a registered mirror (reverse index key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirrorKey(u64);

struct Entry {
    id: ObjectId,
    kind: EntityKind,
    mirror: Box<dyn Mirror>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    service: bool,
}

/// Context handed to factories while a mirror is being constructed.
pub struct FactoryContext<'a> {
    registry: &'a Registry,
    id: &'a str,
    key: MirrorKey,
    parent: Option<ObjectId>,
}

impl<'a> FactoryContext<'a> {
    /// Protocol id of the mirror under construction.
    pub fn id(&self) -> &str {
        self.id
    }

    /// Reverse index key the mirror will be stored under.
    pub fn key(&self) -> MirrorKey {
        self.key
    }

    /// Register the new mirror as a destroyable child of `parent_id`.
    pub fn link_parent(&mut self, parent_id: &str) -> Result<(), HandlerError> {
        if !self.registry.contains(parent_id) {
            return Err(HandlerError::UnknownParent(parent_id.to_string()));
        }
        self.parent = Some(parent_id.to_string());
        Ok(())
    }

    /// Typed access to the linked parent.
    pub fn parent<P: Mirror>(&self) -> Option<&P> {
        self.parent.as_deref().and_then(|id| self.registry.get::<P>(id))
    }

    /// Typed access to any registered mirror.
    pub fn lookup<P: Mirror>(&self, id: &str) -> Option<&P> {
        self.registry.get::<P>(id)
    }
}

/// Handler table plus live mirrors.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<EntityKind, Arc<HandlerDescriptor>>,
    entries: HashMap<MirrorKey, Entry>,
    ids: HashMap<ObjectId, MirrorKey>,
    next_key: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Handler table
    // ========================================================================

    /// Register a descriptor. A kind can only be registered once.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), RegistryError> {
        if self.handlers.contains_key(descriptor.kind()) {
            return Err(RegistryError::DuplicateType(descriptor.kind().to_string()));
        }
        debug!("Registered handler for {}", descriptor.kind());
        self.handlers
            .insert(descriptor.kind().clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn descriptor(&self, kind: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.handlers.get(kind)
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Construct a mirror through its kind's factory, index it, then apply
    /// the payload as a property delta.
    ///
    /// If the payload fails to apply, the mirror stays registered and the
    /// handler error is returned.
    pub fn create(&mut self, kind: &str, id: &str, payload: &Properties) -> Result<MirrorKey, RegistryError> {
        let descriptor = self
            .handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType(kind.to_string()))?;
        let factory = descriptor
            .factory
            .as_ref()
            .ok_or_else(|| RegistryError::NotCreatable(kind.to_string()))?;
        if self.ids.contains_key(id) {
            return Err(RegistryError::DuplicateObject(id.to_string()));
        }

        let key = MirrorKey(self.next_key);
        let mut ctx = FactoryContext {
            registry: self,
            id,
            key,
            parent: None,
        };
        let mirror = factory(payload, &mut ctx).map_err(|source| RegistryError::Handler {
            id: id.to_string(),
            source,
        })?;
        let parent = ctx.parent;

        self.next_key += 1;
        self.insert(key, id, descriptor.kind().clone(), mirror, parent, false);
        debug!("Created {} ({})", id, kind);

        self.apply_properties(id, payload)?;
        Ok(key)
    }

    /// Register a long-lived service object that is not created by the
    /// server. Its kind only needs property, event and method handlers.
    pub fn register_service(
        &mut self,
        id: &str,
        kind: &str,
        mirror: Box<dyn Mirror>,
    ) -> Result<MirrorKey, RegistryError> {
        let descriptor = self
            .handlers
            .get(kind)
            .ok_or_else(|| RegistryError::UnknownType(kind.to_string()))?;
        if self.ids.contains_key(id) {
            return Err(RegistryError::DuplicateObject(id.to_string()));
        }
        let kind = descriptor.kind().clone();
        let key = MirrorKey(self.next_key);
        self.next_key += 1;
        self.insert(key, id, kind, mirror, None, true);
        Ok(key)
    }

    fn insert(
        &mut self,
        key: MirrorKey,
        id: &str,
        kind: EntityKind,
        mirror: Box<dyn Mirror>,
        parent: Option<ObjectId>,
        service: bool,
    ) {
        if let Some(parent_id) = &parent {
            self.add_destroyable_child(parent_id, id);
        }
        self.ids.insert(id.to_string(), key);
        self.entries.insert(
            key,
            Entry {
                id: id.to_string(),
                kind,
                mirror,
                parent,
                children: Vec::new(),
                service,
            },
        );
    }

    /// Record `child_id` as destroyed together with (and before) `parent_id`.
    pub fn add_destroyable_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        let Some(entry) = self.ids.get(parent_id).and_then(|k| self.entries.get_mut(k)) else {
            return false;
        };
        if !entry.children.iter().any(|c| c == child_id) {
            entry.children.push(child_id.to_string());
        }
        true
    }

    /// Apply a property delta in the kind's declared order.
    ///
    /// Stops at the first handler failure. Undeclared properties are ignored.
    pub fn apply_properties(&mut self, id: &str, deltas: &Properties) -> Result<(), RegistryError> {
        let (descriptor, entry) = self.resolve(id)?;

        for name in descriptor.property_names() {
            if let Some(value) = deltas.get(name) {
                descriptor
                    .apply_property(entry.mirror.as_mut(), name, value)
                    .map_err(|source| RegistryError::Handler {
                        id: id.to_string(),
                        source,
                    })?;
            }
        }
        for name in deltas.keys().filter(|k| !descriptor.has_property(k)) {
            debug!("Ignoring undeclared property {}.{}", id, name);
        }
        Ok(())
    }

    /// Run the listener handler of `event`, if the kind declares one.
    pub fn listen(&mut self, id: &str, event: &str, listen: bool) -> Result<(), RegistryError> {
        let (descriptor, entry) = self.resolve(id)?;
        if !descriptor.has_event(event) {
            return Err(RegistryError::UnknownEvent {
                kind: descriptor.kind().to_string(),
                event: event.to_string(),
            });
        }
        if let Some(handler) = descriptor.listener_handlers.get(event) {
            handler(entry.mirror.as_mut(), listen).map_err(|source| RegistryError::Handler {
                id: id.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Invoke a declared method handler.
    pub fn dispatch_method(
        &mut self,
        id: &str,
        method: &str,
        properties: &Properties,
    ) -> Result<(), RegistryError> {
        let (descriptor, entry) = self.resolve(id)?;
        let handler = descriptor
            .method_handlers
            .get(method)
            .ok_or_else(|| RegistryError::UnknownMethod {
                kind: descriptor.kind().to_string(),
                method: method.to_string(),
            })?;
        handler(entry.mirror.as_mut(), properties).map_err(|source| RegistryError::Handler {
            id: id.to_string(),
            source,
        })
    }

    /// Destroy `id` and, before it, every destroyable child (recursively).
    ///
    /// Returns the destroyed ids, children first. Unknown ids are a no-op.
    /// A failing destructor does not keep its mirror alive: the whole
    /// subtree is still removed and the first failure is returned.
    pub fn destroy(&mut self, id: &str) -> Result<Vec<ObjectId>, RegistryError> {
        let mut destroyed = Vec::new();
        let mut failure = None;

        match self.ids.get(id).and_then(|k| self.entries.get(k)) {
            None => return Ok(destroyed),
            Some(entry) if entry.service => {
                warn!("Refusing to destroy service object {}", id);
                return Ok(destroyed);
            }
            Some(_) => {}
        }

        self.destroy_subtree(id, &mut destroyed, &mut failure);
        match failure {
            Some(err) => Err(err),
            None => Ok(destroyed),
        }
    }

    fn destroy_subtree(
        &mut self,
        id: &str,
        destroyed: &mut Vec<ObjectId>,
        failure: &mut Option<RegistryError>,
    ) {
        let Some(&key) = self.ids.get(id) else {
            return;
        };
        let children = self
            .entries
            .get(&key)
            .map(|entry| entry.children.clone())
            .unwrap_or_default();
        for child in &children {
            self.destroy_subtree(child, destroyed, failure);
        }

        let Some(mut entry) = self.entries.remove(&key) else {
            return;
        };
        self.ids.remove(id);

        if let Some(destructor) = self
            .handlers
            .get(&entry.kind)
            .and_then(|d| d.destructor.as_ref())
        {
            if let Err(source) = destructor(entry.mirror.as_mut()) {
                warn!("Destructor of {} failed: {}", id, source);
                failure.get_or_insert(RegistryError::Handler {
                    id: id.to_string(),
                    source,
                });
            }
        }

        if let Some(parent) = entry
            .parent
            .as_deref()
            .and_then(|p| self.ids.get(p))
            .and_then(|k| self.entries.get_mut(k))
        {
            parent.children.retain(|c| c != id);
        }

        debug!("Destroyed {} ({})", id, entry.kind);
        destroyed.push(entry.id);
    }

    /// Destroy every entry, service objects included.
    pub fn clear(&mut self) {
        let roots: Vec<ObjectId> = self
            .entries
            .values()
            .filter(|e| e.parent.is_none())
            .map(|e| e.id.clone())
            .collect();
        let mut destroyed = Vec::new();
        let mut failure = None;
        for id in roots {
            self.destroy_subtree(&id, &mut destroyed, &mut failure);
        }
        self.entries.clear();
        self.ids.clear();
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Forward index: id -> key.
    pub fn key_of(&self, id: &str) -> Option<MirrorKey> {
        self.ids.get(id).copied()
    }

    /// Reverse index: key -> id.
    pub fn id_of(&self, key: MirrorKey) -> Option<&str> {
        self.entries.get(&key).map(|e| e.id.as_str())
    }

    pub fn kind_of(&self, id: &str) -> Option<&EntityKind> {
        self.entry(id).map(|e| &e.kind)
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.entry(id).and_then(|e| e.parent.as_deref())
    }

    pub fn children_of(&self, id: &str) -> &[ObjectId] {
        self.entry(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    /// Typed access to a mirror.
    pub fn get<M: Mirror>(&self, id: &str) -> Option<&M> {
        self.entry(id)
            .and_then(|e| e.mirror.as_ref().as_any().downcast_ref::<M>())
    }

    /// Typed mutable access to a mirror.
    pub fn get_mut<M: Mirror>(&mut self, id: &str) -> Option<&mut M> {
        let key = self.ids.get(id)?;
        self.entries
            .get_mut(key)
            .and_then(|e| e.mirror.as_mut().as_any_mut().downcast_mut::<M>())
    }

    /// Number of live mirrors, service objects included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.ids.get(id).and_then(|k| self.entries.get(k))
    }

    fn resolve(&mut self, id: &str) -> Result<(Arc<HandlerDescriptor>, &mut Entry), RegistryError> {
        let entry = self
            .ids
            .get(id)
            .and_then(|k| self.entries.get_mut(k))
            .ok_or_else(|| RegistryError::UnknownObject(id.to_string()))?;
        let descriptor = self
            .handlers
            .get(&entry.kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType(entry.kind.to_string()))?;
        Ok((descriptor, entry))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("Registry")
            .field("kinds", &kinds)
            .field("entries", &self.entries.len())
            .finish()
    }
}
