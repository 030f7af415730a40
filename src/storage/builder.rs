//! Storage builder and handles.
//!
//! Opens the relational store, starts the mutation drain and hands out the
//! read and write sides.

use std::path::{Path, PathBuf};

use crate::storage::StorageError;
use crate::storage::actor::DrainReport;
use crate::storage::duck::{DuckStore, RowReader};
use crate::storage::queue::{DEFAULT_QUEUE_CAPACITY, MutationQueue, MutationSender};

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    db_path: PathBuf,
    channel_capacity: usize,
}

impl StorageBuilder {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            channel_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Set the mutation queue capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build the storage layer and return handles.
    pub fn build(self) -> Result<StorageHandles, StorageError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Internal(format!(
                    "Failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let store = DuckStore::open(&self.db_path)?;
        // Cloned before the writer moves into the drain thread; both share
        // one database instance.
        let reader = store.reader()?;
        let queue = MutationQueue::spawn(store, self.channel_capacity)?;

        tracing::info!(
            path = %self.db_path.display(),
            capacity = self.channel_capacity,
            "Storage opened"
        );

        Ok(StorageHandles { reader, queue })
    }
}

/// Handles to the relational store.
#[derive(Debug)]
pub struct StorageHandles {
    /// Read side, cloneable.
    pub reader: RowReader,
    queue: MutationQueue,
}

impl StorageHandles {
    pub fn mutations(&self) -> MutationSender {
        self.queue.sender()
    }

    /// Drain the mutation queue and stop the writer.
    ///
    /// Every [`MutationSender`] handed out must be dropped first.
    pub fn shutdown(self) -> Result<DrainReport, StorageError> {
        self.queue.close()
    }
}
