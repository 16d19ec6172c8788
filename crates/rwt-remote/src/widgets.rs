// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Standard widget mirrors.
//!
//! Minimal mirrors for the core widget kinds. They keep only the state the
//! property handlers touch; rendering is out of scope.

use crate::registry::value::{expect_i64, expect_str};
use crate::registry::{
    Bounds, DescriptorBuilder, FactoryContext, HandlerDescriptor, HandlerError, HasBounds,
    HasEnablement, HasToolTip, HasVisibility, Mirror, MirrorKey, Registry, RegistryError,
};
use crate::protocol::Properties;
use serde_json::Value;
use tracing::trace;

pub const COMPOSITE: &str = "rwt.widgets.Composite";
pub const LABEL: &str = "rwt.widgets.Label";
pub const BUTTON: &str = "rwt.widgets.Button";
pub const SCALE: &str = "rwt.widgets.Scale";

/// State shared by every control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    key: MirrorKey,
    bounds: Bounds,
    visible: bool,
    enabled: bool,
    tool_tip: Option<String>,
}

impl Control {
    fn new(key: MirrorKey) -> Self {
        Self {
            key,
            bounds: Bounds::default(),
            visible: true,
            enabled: true,
            tool_tip: None,
        }
    }

    pub fn key(&self) -> MirrorKey {
        self.key
    }
}

macro_rules! impl_control {
    ($($ty:ty),+) => {$(
        impl Mirror for $ty {}

        impl HasBounds for $ty {
            fn bounds(&self) -> Bounds {
                self.control.bounds
            }
            fn set_bounds(&mut self, bounds: Bounds) {
                self.control.bounds = bounds;
            }
        }

        impl HasVisibility for $ty {
            fn is_visible(&self) -> bool {
                self.control.visible
            }
            fn set_visible(&mut self, visible: bool) {
                self.control.visible = visible;
            }
        }

        impl HasEnablement for $ty {
            fn is_enabled(&self) -> bool {
                self.control.enabled
            }
            fn set_enabled(&mut self, enabled: bool) {
                self.control.enabled = enabled;
            }
        }

        impl HasToolTip for $ty {
            fn tool_tip(&self) -> Option<&str> {
                self.control.tool_tip.as_deref()
            }
            fn set_tool_tip(&mut self, tool_tip: Option<String>) {
                self.control.tool_tip = tool_tip;
            }
        }

        impl $ty {
            pub fn control(&self) -> &Control {
                &self.control
            }
        }
    )+};
}

impl_control!(Composite, Label, Button, Scale);

/// Link to the `parent` named in a creation payload, if any.
fn link_payload_parent(props: &Properties, ctx: &mut FactoryContext<'_>) -> Result<(), HandlerError> {
    match props.get("parent") {
        None | Some(Value::Null) => Ok(()),
        Some(parent) => ctx.link_parent(expect_str("parent", parent)?),
    }
}

// ============================================================================
// Composite
// ============================================================================

#[derive(Debug)]
pub struct Composite {
    control: Control,
}

fn composite_descriptor() -> HandlerDescriptor {
    DescriptorBuilder::<Composite>::new(COMPOSITE)
        .factory(|props, ctx| {
            link_payload_parent(props, ctx)?;
            Ok(Composite {
                control: Control::new(ctx.key()),
            })
        })
        .with_control_properties()
        .build()
}

// ============================================================================
// Label
// ============================================================================

#[derive(Debug)]
pub struct Label {
    control: Control,
    text: String,
}

impl Label {
    pub fn text(&self) -> &str {
        &self.text
    }
}

fn label_descriptor() -> HandlerDescriptor {
    DescriptorBuilder::<Label>::new(LABEL)
        .factory(|props, ctx| {
            link_payload_parent(props, ctx)?;
            Ok(Label {
                control: Control::new(ctx.key()),
                text: String::new(),
            })
        })
        .with_control_properties()
        .property("text", |label, value| {
            label.text = expect_str("text", value)?.to_string();
            Ok(())
        })
        .build()
}

// ============================================================================
// Button
// ============================================================================

#[derive(Debug)]
pub struct Button {
    control: Control,
    text: String,
    selection_listened: bool,
    focused: bool,
}

impl Button {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Check if the server listens to `Selection`.
    pub fn has_selection_listener(&self) -> bool {
        self.selection_listened
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }
}

fn button_descriptor() -> HandlerDescriptor {
    DescriptorBuilder::<Button>::new(BUTTON)
        .factory(|props, ctx| {
            link_payload_parent(props, ctx)?;
            Ok(Button {
                control: Control::new(ctx.key()),
                text: String::new(),
                selection_listened: false,
                focused: false,
            })
        })
        .with_control_properties()
        .property("text", |button, value| {
            button.text = expect_str("text", value)?.to_string();
            Ok(())
        })
        .listener("Selection", |button, listen| {
            button.selection_listened = listen;
            Ok(())
        })
        .method("focus", |button, _| {
            trace!("Focus {:?}", button.control.key);
            button.focused = true;
            Ok(())
        })
        .build()
}

// ============================================================================
// Scale
// ============================================================================

/// Range control. `selection` is clamped into `[minimum, maximum]`.
#[derive(Debug)]
pub struct Scale {
    control: Control,
    minimum: i64,
    maximum: i64,
    selection: i64,
}

impl Scale {
    pub fn minimum(&self) -> i64 {
        self.minimum
    }

    pub fn maximum(&self) -> i64 {
        self.maximum
    }

    pub fn selection(&self) -> i64 {
        self.selection
    }

    fn set_minimum(&mut self, minimum: i64) {
        self.minimum = minimum;
        self.maximum = self.maximum.max(minimum);
        self.selection = self.selection.clamp(self.minimum, self.maximum);
    }

    fn set_maximum(&mut self, maximum: i64) {
        self.maximum = maximum.max(self.minimum);
        self.selection = self.selection.clamp(self.minimum, self.maximum);
    }

    fn set_selection(&mut self, selection: i64) {
        self.selection = selection.clamp(self.minimum, self.maximum);
    }
}

fn scale_descriptor() -> HandlerDescriptor {
    DescriptorBuilder::<Scale>::new(SCALE)
        .factory(|props, ctx| {
            link_payload_parent(props, ctx)?;
            Ok(Scale {
                control: Control::new(ctx.key()),
                minimum: 0,
                maximum: 100,
                selection: 0,
            })
        })
        .with_control_properties()
        .property("minimum", |scale, value| {
            scale.set_minimum(expect_i64("minimum", value)?);
            Ok(())
        })
        .property("maximum", |scale, value| {
            scale.set_maximum(expect_i64("maximum", value)?);
            Ok(())
        })
        .property("selection", |scale, value| {
            scale.set_selection(expect_i64("selection", value)?);
            Ok(())
        })
        .event("Selection")
        .build()
}

/// Register the standard widget kinds.
pub fn register_standard(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(composite_descriptor())?;
    registry.register(label_descriptor())?;
    registry.register(button_descriptor())?;
    registry.register(scale_descriptor())?;
    Ok(())
}

/// Fresh registry with the standard widget kinds.
pub fn standard_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    register_standard(&mut registry)?;
    Ok(registry)
}
