// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON wire protocol shared by the operation log and the lifecycle
//! orchestrator.

mod message;
mod operation;

pub use message::{
    ClientMessage, ServerMessage, HEAD_CONNECTION_ID, HEAD_ERROR, HEAD_REQUEST_COUNTER,
};
pub use operation::{ClientOperation, ObjectId, Properties, ServerOperation};
