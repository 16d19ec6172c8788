// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Replays a server instruction batch against the registry.
//!
//! Ordering within a batch:
//!
//! 1. `create`, parents before children (by the `parent` payload property)
//! 2. `set`, `listen`, `call`, `notify` in batch order
//! 3. `destroy`, each cascading to its destroyable children first
//!
//! A failing instruction is recorded in the [`BatchReport`] and skipped; the
//! rest of the batch still runs. This includes instructions that do not
//! parse.

use crate::protocol::{ObjectId, ServerOperation};
use crate::registry::{Registry, RegistryError};
use crate::remote::RemoteObjects;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a single instruction was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("Malformed instruction: {0}")]
    Malformed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// One skipped instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFailure {
    /// Position in the batch.
    pub index: usize,
    pub action: &'static str,
    pub target: ObjectId,
    pub error: InstructionError,
}

impl fmt::Display for InstructionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}: {}",
            self.index, self.action, self.target, self.error
        )
    }
}

/// Outcome of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Instructions applied without error.
    pub applied: usize,
    /// One entry per failure. A `listen` instruction may fail per event.
    pub failures: Vec<InstructionFailure>,
    /// Ids created by this batch.
    pub created: Vec<ObjectId>,
    /// Ids destroyed by this batch, cascades included.
    pub destroyed: Vec<ObjectId>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Applied instructions plus recorded failures.
    pub fn total(&self) -> usize {
        self.applied + self.failures.len()
    }

    fn fail(&mut self, index: usize, action: &'static str, target: &str, error: InstructionError) {
        warn!("Skipping #{} {} {}: {}", index, action, target, error);
        self.failures.push(InstructionFailure {
            index,
            action,
            target: target.to_string(),
            error,
        });
    }
}

/// Apply typed `operations` in lifecycle-safe order.
pub fn apply_batch(
    registry: &mut Registry,
    remote_objects: &mut RemoteObjects,
    operations: &[ServerOperation],
) -> BatchReport {
    let indexed: Vec<(usize, &ServerOperation)> = operations.iter().enumerate().collect();
    apply_indexed(registry, remote_objects, &indexed, BatchReport::default())
}

/// Parse and apply raw wire instructions.
///
/// Instructions that do not parse are reported as
/// [`InstructionError::Malformed`]; the others are applied as by
/// [`apply_batch`], keeping their original batch index.
pub fn apply_instructions(
    registry: &mut Registry,
    remote_objects: &mut RemoteObjects,
    instructions: &[Value],
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut parsed = Vec::with_capacity(instructions.len());
    for (index, raw) in instructions.iter().enumerate() {
        match ServerOperation::from_value(raw) {
            Ok(op) => parsed.push((index, op)),
            Err(message) => report.fail(
                index,
                raw_action(raw),
                raw_target(raw),
                InstructionError::Malformed(message),
            ),
        }
    }

    let indexed: Vec<(usize, &ServerOperation)> = parsed.iter().map(|(i, op)| (*i, op)).collect();
    apply_indexed(registry, remote_objects, &indexed, report)
}

fn raw_action(raw: &Value) -> &'static str {
    match raw.get(0).and_then(Value::as_str) {
        Some("create") => "create",
        Some("set") => "set",
        Some("listen") => "listen",
        Some("call") => "call",
        Some("notify") => "notify",
        Some("destroy") => "destroy",
        _ => "unknown",
    }
}

fn raw_target(raw: &Value) -> &str {
    raw.get(1).and_then(Value::as_str).unwrap_or_default()
}

fn apply_indexed(
    registry: &mut Registry,
    remote_objects: &mut RemoteObjects,
    operations: &[(usize, &ServerOperation)],
    mut report: BatchReport,
) -> BatchReport {
    for slot in creation_order(operations) {
        let (index, op) = operations[slot];
        apply_one(registry, remote_objects, index, op, &mut report);
    }
    for &(index, op) in operations {
        if !matches!(op, ServerOperation::Create { .. } | ServerOperation::Destroy { .. }) {
            apply_one(registry, remote_objects, index, op, &mut report);
        }
    }
    for &(index, op) in operations {
        if matches!(op, ServerOperation::Destroy { .. }) {
            apply_one(registry, remote_objects, index, op, &mut report);
        }
    }

    debug!(
        "Applied batch: {} ok, {} failed, {} created, {} destroyed",
        report.applied,
        report.failures.len(),
        report.created.len(),
        report.destroyed.len()
    );
    report
}

fn apply_one(
    registry: &mut Registry,
    remote_objects: &mut RemoteObjects,
    index: usize,
    op: &ServerOperation,
    report: &mut BatchReport,
) {
    let target = op.target();
    let outcome = match op {
        ServerOperation::Create {
            type_name,
            properties,
            ..
        } => registry.create(type_name, target, properties).map(|_| {
            remote_objects.get_or_create(target);
            report.created.push(target.to_string());
        }),
        ServerOperation::Set { properties, .. } => registry.apply_properties(target, properties),
        ServerOperation::Listen { listeners, .. } => {
            apply_listen(registry, remote_objects, index, target, listeners, report);
            return;
        }
        ServerOperation::Call {
            method, properties, ..
        } => registry.dispatch_method(target, method, properties),
        ServerOperation::Notify { event, .. } => {
            debug!("Server acknowledged {} on {}", event, target);
            Ok(())
        }
        ServerOperation::Destroy { .. } => {
            let outcome = registry.destroy(target).map(|ids| {
                report.destroyed.extend(ids);
            });
            remote_objects.retain(|id| registry.contains(id));
            outcome
        }
    };

    match outcome {
        Ok(()) => report.applied += 1,
        Err(error) => report.fail(index, op.action(), target, error.into()),
    }
}

/// Each event is applied on its own; a rejected event does not stop the
/// ones after it.
fn apply_listen(
    registry: &mut Registry,
    remote_objects: &mut RemoteObjects,
    index: usize,
    target: &str,
    listeners: &BTreeMap<String, bool>,
    report: &mut BatchReport,
) {
    let mut clean = true;
    for (event, &listen) in listeners {
        match registry.listen(target, event, listen) {
            Ok(()) => remote_objects.get_or_create(target).listen(event, listen),
            Err(error) => {
                clean = false;
                report.fail(index, "listen", target, error.into());
            }
        }
    }
    if clean {
        report.applied += 1;
    }
}

/// Slots of `create` instructions, each parent created in this batch
/// ahead of its children. Otherwise batch order is kept.
fn creation_order(operations: &[(usize, &ServerOperation)]) -> Vec<usize> {
    let creates: Vec<(usize, &str, Option<&str>)> = operations
        .iter()
        .enumerate()
        .filter_map(|(slot, (_, op))| match op {
            ServerOperation::Create {
                target, properties, ..
            } => Some((
                slot,
                target.as_str(),
                properties.get("parent").and_then(Value::as_str),
            )),
            _ => None,
        })
        .collect();

    let by_target: HashMap<&str, usize> = creates
        .iter()
        .enumerate()
        .map(|(pos, (_, target, _))| (*target, pos))
        .collect();

    let mut order = Vec::with_capacity(creates.len());
    let mut visited = HashSet::new();
    for pos in 0..creates.len() {
        visit(pos, &creates, &by_target, &mut visited, &mut order);
    }
    order
}

fn visit(
    pos: usize,
    creates: &[(usize, &str, Option<&str>)],
    by_target: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(pos) {
        return;
    }
    let (slot, _, parent) = creates[pos];
    if let Some(&parent_pos) = parent.and_then(|p| by_target.get(p)) {
        visit(parent_pos, creates, by_target, visited, order);
    }
    order.push(slot);
}
