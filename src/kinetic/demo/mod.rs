// SPDX-License-Identifier: MIT

//! The graph served by `/generate`: a chat assistant with long-term memory
//! kept in the key-value store.

pub mod graph;
pub mod state;

pub use graph::{builder, DEMO_GRAPH_NAME};
pub use state::{ChatState, Message};
