//! Fixed-size worker pool fanning devices out to a [`DevicePoller`].

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::poller::{DevicePoller, PollSummary};

/// Totals over one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub devices: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub summary: PollSummary,
}

impl PoolReport {
    fn merge(&mut self, other: PoolReport) {
        self.devices += other.devices;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.summary.merge(other.summary);
    }
}

/// Handle returned by [`WorkerPool::start`].
pub struct WorkerPool {
    job: String,
    producer: JoinHandle<()>,
    workers: Vec<JoinHandle<PoolReport>>,
}

impl WorkerPool {
    /// Start `workers` workers pulling from a single producer over `devices`.
    ///
    /// Each device runs in its own task, so a panic in one poll is reported
    /// as a failure of that device and the worker moves on.
    pub fn start<P, I>(poller: Arc<P>, workers: usize, devices: I) -> Self
    where
        P: DevicePoller,
        I: IntoIterator<Item = P::Device>,
        I::IntoIter: Send + 'static,
    {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<P::Device>(workers);
        let devices = devices.into_iter();

        let producer = tokio::spawn(async move {
            for device in devices {
                if tx.send(device).await.is_err() {
                    break;
                }
            }
        });

        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let poller = Arc::clone(&poller);
                tokio::spawn(run_worker(worker, poller, rx))
            })
            .collect();

        tracing::info!(job = poller.name(), workers, "Worker pool started");

        Self {
            job: poller.name().to_string(),
            producer,
            workers: handles,
        }
    }

    /// Wait until the producer is exhausted and every worker has exited.
    pub async fn wait(self) -> PoolReport {
        if let Err(e) = self.producer.await {
            tracing::error!(job = %self.job, error = %e, "Device producer failed");
        }

        let mut report = PoolReport::default();
        for handle in self.workers {
            match handle.await {
                Ok(worker) => report.merge(worker),
                Err(e) => tracing::error!(job = %self.job, error = %e, "Worker task failed"),
            }
        }

        tracing::info!(
            job = %self.job,
            devices = report.devices,
            succeeded = report.succeeded,
            failed = report.failed,
            samples = report.summary.samples,
            mutations = report.summary.mutations,
            dropped = report.summary.dropped,
            "Worker pool finished"
        );
        report
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("job", &self.job)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

async fn run_worker<P: DevicePoller>(
    worker: usize,
    poller: Arc<P>,
    rx: Arc<Mutex<mpsc::Receiver<P::Device>>>,
) -> PoolReport {
    let mut report = PoolReport::default();

    loop {
        let next = rx.lock().await.recv().await;
        let Some(device) = next else { break };

        let label = poller.describe(&device);
        report.devices += 1;

        let task = {
            let poller = Arc::clone(&poller);
            tokio::spawn(async move { poller.poll(device).await })
        };

        match task.await {
            Ok(Ok(summary)) => {
                report.succeeded += 1;
                report.summary.merge(summary);
                tracing::debug!(
                    worker,
                    device = %label,
                    samples = summary.samples,
                    mutations = summary.mutations,
                    dropped = summary.dropped,
                    "Device done"
                );
            }
            Ok(Err(e)) => {
                report.failed += 1;
                if e.is_connection() {
                    tracing::info!(worker, device = %label, error = %e, "Device unreachable");
                } else {
                    tracing::error!(worker, device = %label, error = %e, "Device failed");
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(worker, device = %label, error = %e, "Device poll panicked");
            }
        }
    }

    report
}
