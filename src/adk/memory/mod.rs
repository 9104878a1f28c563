// SPDX-License-Identifier: MIT

//! Persistence collaborators for graph invocations
//!
//! - [`BaseStore`] - namespaced key-value store nodes read and write
//! - [`Checkpointer`] - per-thread snapshots of channel values
//!
//! Each trait has a Postgres implementation for deployments and an
//! in-memory one for tests and local runs.

mod checkpoint;
mod in_memory;
mod postgres;
mod store;

pub use checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, Checkpointer};
pub use in_memory::{InMemorySaver, InMemoryStore};
pub use postgres::{PostgresSaver, PostgresStore};
pub use store::{validate_namespace, BaseStore, Item, Namespace};
