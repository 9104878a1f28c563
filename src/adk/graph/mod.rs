// SPDX-License-Identifier: MIT

//! State graph engine
//!
//! A [`StateGraph`] declares typed channels (a [`StateSchema`]) and nodes
//! wired by dependencies. Compiling it against a [`BaseStore`] and a
//! [`Checkpointer`] yields a [`CompiledGraph`] that runs per thread id.
//!
//! [`BaseStore`]: crate::adk::memory::BaseStore
//! [`Checkpointer`]: crate::adk::memory::Checkpointer

mod builder;
mod compiled;
pub mod config;
mod node;
pub mod state;

pub use builder::{NodeBuilder, Predicate, StateGraph, WaitMode};
pub use compiled::CompiledGraph;
pub use config::RunnableConfig;
pub use node::{node_fn, FnNode, Node, RunContext};
pub use state::{GraphState, Reducer, StateSchema, StateUpdate};
