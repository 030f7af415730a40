//! Drain actor: a dedicated thread owning the write connection.
//!
//! Single-writer pattern: the thread applies queued mutations in FIFO order
//! until every sender is gone. A failing statement is logged and dropped;
//! the drain carries on with the next one.

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::Receiver;

use crate::storage::StorageError;
use crate::storage::queue::{Mutation, SqlArg};

/// Anything that can apply a parameterized write.
pub trait RelationalStore: Send + 'static {
    /// Execute one statement, returning the number of affected rows.
    fn execute(&mut self, statement: &str, args: &[SqlArg]) -> Result<usize, StorageError>;

    /// Called once after the last mutation has been applied.
    fn finish(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Counters returned when the drain stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: u64,
    pub failed: u64,
}

pub struct MutationActor<S> {
    store: S,
    rx: Receiver<Mutation>,
    report: DrainReport,
}

impl<S: RelationalStore> MutationActor<S> {
    /// Spawn the drain thread.
    pub fn spawn(
        store: S,
        rx: Receiver<Mutation>,
    ) -> Result<JoinHandle<DrainReport>, StorageError> {
        let mut actor = MutationActor {
            store,
            rx,
            report: DrainReport::default(),
        };
        thread::Builder::new()
            .name("mutation-drain".to_string())
            .spawn(move || actor.run())
            .map_err(|e| StorageError::Internal(format!("failed to spawn drain thread: {e}")))
    }

    fn run(&mut self) -> DrainReport {
        tracing::debug!("Mutation drain started");

        while let Some(mutation) = self.rx.blocking_recv() {
            match self.store.execute(&mutation.statement, &mutation.args) {
                Ok(_) => self.report.applied += 1,
                Err(e) => {
                    self.report.failed += 1;
                    tracing::error!(
                        error = %e,
                        statement = %mutation.statement,
                        args = ?mutation.args,
                        "Mutation failed, dropping"
                    );
                }
            }
        }

        if let Err(e) = self.store.finish() {
            tracing::error!(error = %e, "Final checkpoint failed");
        }

        tracing::info!(
            applied = self.report.applied,
            failed = self.report.failed,
            "Mutation drain stopped"
        );
        self.report
    }
}
