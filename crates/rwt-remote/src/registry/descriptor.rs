// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handler descriptors.
//!
//! A [`DescriptorBuilder`] collects strongly typed handlers for one mirror
//! type and erases them into a [`HandlerDescriptor`], which the registry
//! stores per [`EntityKind`]. Descriptors are immutable once built.
//!
//! ```ignore
//! let descriptor = DescriptorBuilder::<Scale>::new("rwt.widgets.Scale")
//!     .factory(|_props, ctx| Ok(Scale::new(ctx.key())))
//!     .property("minimum", |scale, v| scale.set_minimum(expect_i64("minimum", v)?))
//!     .property("maximum", |scale, v| scale.set_maximum(expect_i64("maximum", v)?))
//!     .property("selection", |scale, v| scale.set_selection(expect_i64("selection", v)?))
//!     .build();
//! ```

use super::{FactoryContext, HandlerError, Mirror};
use crate::protocol::Properties;
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

/// Registered type name of a remote entity (e.g. `rwt.widgets.Button`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKind(String);

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

pub(crate) type Factory = Box<
    dyn Fn(&Properties, &mut FactoryContext<'_>) -> Result<Box<dyn Mirror>, HandlerError> + Send + Sync,
>;
pub(crate) type Destructor = Box<dyn Fn(&mut dyn Mirror) -> Result<(), HandlerError> + Send + Sync>;
pub(crate) type PropertyHandler =
    Box<dyn Fn(&mut dyn Mirror, &Value) -> Result<(), HandlerError> + Send + Sync>;
pub(crate) type ListenerHandler =
    Box<dyn Fn(&mut dyn Mirror, bool) -> Result<(), HandlerError> + Send + Sync>;
pub(crate) type MethodHandler =
    Box<dyn Fn(&mut dyn Mirror, &Properties) -> Result<(), HandlerError> + Send + Sync>;

/// Type-erased handler table entry for one entity kind.
pub struct HandlerDescriptor {
    pub(crate) kind: EntityKind,
    pub(crate) factory: Option<Factory>,
    pub(crate) destructor: Option<Destructor>,
    pub(crate) property_names: Vec<String>,
    pub(crate) property_handlers: HashMap<String, PropertyHandler>,
    pub(crate) events: HashSet<String>,
    pub(crate) listener_handlers: HashMap<String, ListenerHandler>,
    pub(crate) method_handlers: HashMap<String, MethodHandler>,
}

impl HandlerDescriptor {
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// Declared properties, in application order.
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property_names.iter().any(|p| p == name)
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.events.contains(event)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.method_handlers.contains_key(method)
    }

    /// Check if the type can be created through `create` instructions.
    pub fn is_creatable(&self) -> bool {
        self.factory.is_some()
    }

    /// Apply one property through its handler, or the mirror's default
    /// assignment when none is declared.
    pub(crate) fn apply_property(
        &self,
        mirror: &mut dyn Mirror,
        name: &str,
        value: &Value,
    ) -> Result<(), HandlerError> {
        match self.property_handlers.get(name) {
            Some(handler) => handler(mirror, value),
            None => mirror.assign(name, value),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.method_handlers.keys().collect();
        methods.sort();
        let mut events: Vec<_> = self.events.iter().collect();
        events.sort();
        f.debug_struct("HandlerDescriptor")
            .field("kind", &self.kind)
            .field("creatable", &self.factory.is_some())
            .field("property_names", &self.property_names)
            .field("events", &events)
            .field("methods", &methods)
            .finish()
    }
}

fn downcast_mut<M: Mirror>(mirror: &mut dyn Mirror) -> Result<&mut M, HandlerError> {
    mirror
        .as_any_mut()
        .downcast_mut::<M>()
        .ok_or(HandlerError::TypeMismatch {
            expected: std::any::type_name::<M>(),
        })
}

/// Typed builder for a [`HandlerDescriptor`].
pub struct DescriptorBuilder<M: Mirror> {
    descriptor: HandlerDescriptor,
    _mirror: PhantomData<fn() -> M>,
}

impl<M: Mirror> DescriptorBuilder<M> {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            descriptor: HandlerDescriptor {
                kind: EntityKind::new(kind),
                factory: None,
                destructor: None,
                property_names: Vec::new(),
                property_handlers: HashMap::new(),
                events: HashSet::new(),
                listener_handlers: HashMap::new(),
                method_handlers: HashMap::new(),
            },
            _mirror: PhantomData,
        }
    }

    /// Construct mirrors from a creation payload.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Properties, &mut FactoryContext<'_>) -> Result<M, HandlerError> + Send + Sync + 'static,
    {
        self.descriptor.factory = Some(Box::new(
            move |props: &Properties, ctx: &mut FactoryContext<'_>| {
                factory(props, ctx).map(|mirror| Box::new(mirror) as Box<dyn Mirror>)
            },
        ));
        self
    }

    /// Tear down a mirror before it leaves the registry.
    pub fn destructor<F>(mut self, destructor: F) -> Self
    where
        F: Fn(&mut M) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.descriptor.destructor = Some(Box::new(move |mirror: &mut dyn Mirror| {
            destructor(downcast_mut(mirror)?)
        }));
        self
    }

    /// Declare a property applied through [`Mirror::assign`].
    pub fn property_name(mut self, name: &str) -> Self {
        self.declare_property(name);
        self
    }

    /// Declare a property with a dedicated handler.
    ///
    /// Properties are applied in declaration order.
    pub fn property<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&mut M, &Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.declare_property(name);
        self.descriptor.property_handlers.insert(
            name.to_string(),
            Box::new(move |mirror: &mut dyn Mirror, value: &Value| {
                handler(downcast_mut(mirror)?, value)
            }),
        );
        self
    }

    /// Declare an event the server may listen to.
    pub fn event(mut self, event: &str) -> Self {
        self.descriptor.events.insert(event.to_string());
        self
    }

    /// Declare an event with a handler invoked on listen changes.
    pub fn listener<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&mut M, bool) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.descriptor.events.insert(event.to_string());
        self.descriptor.listener_handlers.insert(
            event.to_string(),
            Box::new(move |mirror: &mut dyn Mirror, listen: bool| {
                handler(downcast_mut(mirror)?, listen)
            }),
        );
        self
    }

    /// Declare a remotely invocable method.
    pub fn method<F>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(&mut M, &Properties) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.descriptor.method_handlers.insert(
            method.to_string(),
            Box::new(move |mirror: &mut dyn Mirror, props: &Properties| {
                handler(downcast_mut(mirror)?, props)
            }),
        );
        self
    }

    pub fn build(self) -> HandlerDescriptor {
        self.descriptor
    }

    fn declare_property(&mut self, name: &str) {
        if !self.descriptor.has_property(name) {
            self.descriptor.property_names.push(name.to_string());
        }
    }
}
