// SPDX-License-Identifier: MIT

//! State management for graph invocations
//!
//! This module provides:
//! - `StateSchema` - declares the channels a graph state carries
//! - `GraphState` - runtime channel values with reducer support
//! - `Reducer` - strategies for folding node updates into channels

mod schema;
mod values;

pub use schema::{Channel, Reducer, StateSchema};
pub use values::{GraphState, StateUpdate};
