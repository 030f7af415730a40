//! Mutation queue: bounded channel in front of the relational writer.
//!
//! Workers call [`MutationSender::queue`], which waits while the channel is
//! full, so a slow database throttles the pollers instead of growing memory.

use std::borrow::Cow;
use std::thread::JoinHandle;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;

use crate::storage::StorageError;
use crate::storage::actor::{DrainReport, MutationActor, RelationalStore};

/// Default capacity of the mutation channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// A bound statement argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlArg {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Decimal> for SqlArg {
    fn from(v: Decimal) -> Self {
        match v.to_i64() {
            Some(i) if v.fract().is_zero() => Self::Int(i),
            _ => v.to_f64().map_or(Self::Null, Self::Float),
        }
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A parameterized write statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub statement: Cow<'static, str>,
    pub args: Vec<SqlArg>,
}

impl Mutation {
    pub fn new(statement: impl Into<Cow<'static, str>>, args: Vec<SqlArg>) -> Self {
        Self {
            statement: statement.into(),
            args,
        }
    }
}

/// Cloneable producer side of the queue.
#[derive(Debug, Clone)]
pub struct MutationSender {
    tx: mpsc::Sender<Mutation>,
}

impl MutationSender {
    /// Enqueue a statement, waiting for room if the queue is full.
    pub async fn queue(
        &self,
        statement: impl Into<Cow<'static, str>>,
        args: Vec<SqlArg>,
    ) -> Result<(), StorageError> {
        self.send(Mutation::new(statement, args)).await
    }

    pub async fn send(&self, mutation: Mutation) -> Result<(), StorageError> {
        self.tx
            .send(mutation)
            .await
            .map_err(|_| StorageError::ChannelSend)
    }
}

/// Owner of the drain thread.
///
/// [`close`](Self::close) drops the queue's own sender and waits for the
/// drain to apply everything already queued. It returns once every other
/// [`MutationSender`] clone has been dropped too.
pub struct MutationQueue {
    sender: MutationSender,
    handle: Option<JoinHandle<DrainReport>>,
}

impl MutationQueue {
    /// Start draining into `store`.
    pub fn spawn<S: RelationalStore>(store: S, capacity: usize) -> Result<Self, StorageError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = MutationActor::spawn(store, rx)?;
        Ok(Self {
            sender: MutationSender { tx },
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> MutationSender {
        self.sender.clone()
    }

    /// Close the queue and wait for the drain to finish.
    pub fn close(mut self) -> Result<DrainReport, StorageError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| StorageError::Internal("mutation queue already closed".to_string()))?;
        drop(self);

        handle
            .join()
            .map_err(|_| StorageError::Internal("Failed to join mutation drain thread".to_string()))
    }
}

impl Drop for MutationQueue {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("Mutation queue dropped without close; drain continues detached");
        }
    }
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationQueue")
            .field("capacity", &self.sender.tx.max_capacity())
            .field("closed", &self.handle.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    /// Records statements; fails any statement whose first argument
    /// equals `fail_on`.
    #[derive(Clone, Default)]
    struct MemoryStore {
        applied: Arc<Mutex<Vec<i64>>>,
        count: Arc<AtomicUsize>,
        fail_on: Option<i64>,
        delay: Option<Duration>,
    }

    impl RelationalStore for MemoryStore {
        fn execute(&mut self, _statement: &str, args: &[SqlArg]) -> Result<usize, StorageError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let SqlArg::Int(n) = args[0] else {
                return Err(StorageError::InvalidData("expected int".into()));
            };
            if self.fail_on == Some(n) {
                return Err(StorageError::InvalidData(format!("row {n} rejected")));
            }
            self.applied.lock().unwrap().push(n);
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_failed_statement_is_dropped() {
        let store = MemoryStore {
            fail_on: Some(5_000),
            ..Default::default()
        };
        let applied = Arc::clone(&store.applied);
        let queue = MutationQueue::spawn(store, 128).unwrap();

        let sender = queue.sender();
        for i in 1..=10_000i64 {
            sender
                .queue("INSERT INTO t VALUES (?)", vec![i.into()])
                .await
                .unwrap();
        }
        drop(sender);

        let report = queue.close().unwrap();
        assert_eq!(report.applied, 9_999);
        assert_eq!(report.failed, 1);

        let applied = applied.lock().unwrap();
        assert_eq!(applied.len(), 9_999);
        assert!(!applied.contains(&5_000));
        // drain preserves queue order
        assert!(applied.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_drain_throttles_producers() {
        const CAPACITY: usize = 4;
        const PRODUCERS: i64 = 8;
        const PER_PRODUCER: i64 = 25;

        let store = MemoryStore {
            delay: Some(Duration::from_millis(1)),
            ..Default::default()
        };
        let count = Arc::clone(&store.count);
        let queue = MutationQueue::spawn(store, CAPACITY).unwrap();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let sender = queue.sender();
                tokio::spawn(async move {
                    for i in 0..PER_PRODUCER {
                        sender
                            .queue("INSERT INTO t VALUES (?)", vec![(p * 1_000 + i).into()])
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.await.unwrap();
        }

        // every producer has returned; at most a full channel plus the
        // statement in flight is still unapplied
        let total = (PRODUCERS * PER_PRODUCER) as usize;
        let outstanding = total - count.load(Ordering::SeqCst);
        assert!(outstanding <= CAPACITY + 1, "outstanding = {outstanding}");

        let report = queue.close().unwrap();
        assert_eq!(report.applied as usize, total);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding_senders() {
        let queue = MutationQueue::spawn(MemoryStore::default(), 4).unwrap();
        let sender = queue.sender();
        let closer = std::thread::spawn(move || queue.close());

        // the drain thread cannot finish while this sender lives
        std::thread::sleep(Duration::from_millis(20));
        assert!(!closer.is_finished());
        sender.queue("INSERT", vec![1i64.into()]).await.unwrap();
        drop(sender);

        let report = closer.join().unwrap().unwrap();
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_decimal_args() {
        assert_eq!(SqlArg::from(Decimal::new(12346, 0)), SqlArg::Int(12346));
        assert_eq!(SqlArg::from(Decimal::new(-215, 1)), SqlArg::Float(-21.5));
        assert_eq!(SqlArg::from(None::<i64>), SqlArg::Null);
    }
}
