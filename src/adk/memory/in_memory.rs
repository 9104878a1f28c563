// SPDX-License-Identifier: MIT

//! Process-local store and saver, for tests and single-process runs

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::checkpoint::{require_thread_id, Checkpoint, Checkpointer};
use super::store::{namespace_to_prefix, validate_namespace, BaseStore, Item};
use crate::adk::error::{CheckpointError, StoreError};
use crate::adk::graph::RunnableConfig;

/// In-memory key-value store
#[derive(Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<(String, String), Item>>,
    closed: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BaseStore for InMemoryStore {
    async fn setup(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_open()?;
        validate_namespace(namespace)?;

        let now = Utc::now();
        let mut items = self.items.write().await;
        let slot = (namespace_to_prefix(namespace), key.to_string());
        let created_at = items.get(&slot).map(|i| i.created_at).unwrap_or(now);
        items.insert(
            slot,
            Item {
                namespace: namespace.to_vec(),
                key: key.to_string(),
                value,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>, StoreError> {
        self.ensure_open()?;
        validate_namespace(namespace)?;

        let items = self.items.read().await;
        Ok(items
            .get(&(namespace_to_prefix(namespace), key.to_string()))
            .cloned())
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        validate_namespace(namespace)?;

        let mut items = self.items.write().await;
        items.remove(&(namespace_to_prefix(namespace), key.to_string()));
        Ok(())
    }

    async fn search(
        &self,
        namespace_prefix: &[String],
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        self.ensure_open()?;
        validate_namespace(namespace_prefix)?;

        let items = self.items.read().await;
        let mut hits: Vec<Item> = items
            .values()
            .filter(|item| item.namespace.starts_with(namespace_prefix))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// In-memory checkpoint saver (full history per thread)
#[derive(Default)]
pub struct InMemorySaver {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
    closed: AtomicBool,
}

impl InMemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), CheckpointError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CheckpointError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Checkpointer for InMemorySaver {
    async fn setup(&self) -> Result<(), CheckpointError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.ensure_open()?;
        let mut threads = self.threads.write().await;
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        match history.iter_mut().find(|c| c.id == checkpoint.id) {
            Some(existing) => *existing = checkpoint.clone(),
            None => history.push(checkpoint.clone()),
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        self.ensure_open()?;
        let thread_id = require_thread_id(config)?;
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .and_then(|history| history.iter().max_by_key(|c| c.step))
            .cloned())
    }

    async fn list(
        &self,
        config: &RunnableConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.ensure_open()?;
        let thread_id = require_thread_id(config)?;
        let threads = self.threads.read().await;
        let mut history = threads.get(thread_id).cloned().unwrap_or_default();
        history.sort_by(|a, b| b.step.cmp(&a.step));
        if let Some(limit) = limit {
            history.truncate(limit);
        }
        Ok(history)
    }
}
