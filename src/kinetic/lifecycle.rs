// SPDX-License-Identifier: MIT

//! Connection lifecycle - open and set up the store and checkpointer once,
//! release them once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::{CheckpointError, DeployError, StoreError};
use crate::adk::memory::{BaseStore, Checkpointer, PostgresSaver, PostgresStore};

/// The two persistence handles every request borrows
#[derive(Clone)]
pub struct ConnectionPair {
    pub store: Arc<dyn BaseStore>,
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl ConnectionPair {
    /// Open both Postgres handles on `database_url` and run their setup.
    ///
    /// If anything fails, handles that were already opened are closed
    /// before the error is returned.
    pub async fn open(database_url: &str) -> Result<Self, DeployError> {
        Self::open_with(
            async {
                PostgresStore::open(database_url)
                    .await
                    .map(|store| Arc::new(store) as Arc<dyn BaseStore>)
            },
            async {
                PostgresSaver::open(database_url)
                    .await
                    .map(|saver| Arc::new(saver) as Arc<dyn Checkpointer>)
            },
        )
        .await
    }

    /// Open the store, then the checkpointer, then run setup on both.
    ///
    /// `open_checkpointer` is not polled until the store is open, and the
    /// store is closed if it fails.
    pub async fn open_with<S, C>(open_store: S, open_checkpointer: C) -> Result<Self, DeployError>
    where
        S: Future<Output = Result<Arc<dyn BaseStore>, StoreError>>,
        C: Future<Output = Result<Arc<dyn Checkpointer>, CheckpointError>>,
    {
        log::info!("Opening key-value store");
        let store = open_store.await?;

        log::info!("Opening checkpoint store");
        let checkpointer = match open_checkpointer.await {
            Ok(checkpointer) => checkpointer,
            Err(e) => {
                log::error!("Checkpoint store failed to open: {}", e);
                store.close().await;
                return Err(e.into());
            }
        };

        Self::prepare(store, checkpointer).await
    }

    /// Run `setup()` on already-opened handles, closing both on failure
    pub async fn prepare(
        store: Arc<dyn BaseStore>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<Self, DeployError> {
        let pair = Self {
            store,
            checkpointer,
        };

        if let Err(e) = pair.store.setup().await {
            log::error!("Key-value store setup failed: {}", e);
            pair.close_all().await;
            return Err(e.into());
        }
        if let Err(e) = pair.checkpointer.setup().await {
            log::error!("Checkpoint store setup failed: {}", e);
            pair.close_all().await;
            return Err(e.into());
        }

        log::info!("Store and checkpointer ready");
        Ok(pair)
    }

    /// Close the checkpointer, then the store, each bounded by `grace`
    pub async fn release(self, grace: Duration) {
        if tokio::time::timeout(grace, self.checkpointer.close())
            .await
            .is_err()
        {
            log::warn!("Checkpoint store did not close within {:?}", grace);
        }
        if tokio::time::timeout(grace, self.store.close())
            .await
            .is_err()
        {
            log::warn!("Key-value store did not close within {:?}", grace);
        }
        log::info!("Connections released");
    }

    async fn close_all(&self) {
        self.checkpointer.close().await;
        self.store.close().await;
    }
}
