// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability traits shared by control-like mirrors.
//!
//! A mirror opts into a capability by implementing its trait; the matching
//! `with_*` builder method then installs the standard property handler.

use super::value::{expect_bool, expect_i64_array, optional_str};
use super::{DescriptorBuilder, HandlerError, Mirror};
use serde_json::Value;

/// Position and size in parent coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    /// Parse `[x, y, width, height]`.
    pub fn from_value(value: &Value) -> Result<Self, HandlerError> {
        let [x, y, width, height] = expect_i64_array::<4>("bounds", value)?;
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

pub trait HasBounds {
    fn bounds(&self) -> Bounds;
    fn set_bounds(&mut self, bounds: Bounds);
}

pub trait HasVisibility {
    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);
}

pub trait HasEnablement {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}

pub trait HasToolTip {
    fn tool_tip(&self) -> Option<&str>;
    fn set_tool_tip(&mut self, tool_tip: Option<String>);
}

impl<M: Mirror + HasBounds> DescriptorBuilder<M> {
    /// `bounds` as `[x, y, width, height]`.
    pub fn with_bounds(self) -> Self {
        self.property("bounds", |mirror: &mut M, value| {
            mirror.set_bounds(Bounds::from_value(value)?);
            Ok(())
        })
    }
}

impl<M: Mirror + HasVisibility> DescriptorBuilder<M> {
    pub fn with_visibility(self) -> Self {
        self.property("visibility", |mirror: &mut M, value| {
            mirror.set_visible(expect_bool("visibility", value)?);
            Ok(())
        })
    }
}

impl<M: Mirror + HasEnablement> DescriptorBuilder<M> {
    pub fn with_enablement(self) -> Self {
        self.property("enabled", |mirror: &mut M, value| {
            mirror.set_enabled(expect_bool("enabled", value)?);
            Ok(())
        })
    }
}

impl<M: Mirror + HasToolTip> DescriptorBuilder<M> {
    pub fn with_tool_tip(self) -> Self {
        self.property("toolTip", |mirror: &mut M, value| {
            mirror.set_tool_tip(optional_str("toolTip", value)?.map(str::to_string));
            Ok(())
        })
    }
}

impl<M> DescriptorBuilder<M>
where
    M: Mirror + HasBounds + HasVisibility + HasEnablement + HasToolTip,
{
    /// All control capabilities, bounds first.
    pub fn with_control_properties(self) -> Self {
        self.with_bounds()
            .with_visibility()
            .with_enablement()
            .with_tool_tip()
    }
}
