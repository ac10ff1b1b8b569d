use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use log::{error, info};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::errors::{Result, StoreError};

type QueueJob = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum QueueCommand {
    Run(QueueJob),
    Shutdown,
}

struct WriteQueueInner {
    sender: mpsc::UnboundedSender<QueueCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WriteQueueInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // The worker finishes whatever is already queued and then exits.
        if guard.take().is_some() && self.sender.send(QueueCommand::Shutdown).is_err() {
            error!("Failed to send shutdown to write queue worker");
        }
    }
}

/// Single worker task that runs host jobs one at a time, strictly in
/// submission order. Every touch of the host blob goes through here, so
/// reads never observe a half-finished write sequence.
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<WriteQueueInner>,
}

impl WriteQueue {
    /// Spawns the worker; must be called from within a tokio runtime.
    pub fn start() -> Self {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<QueueCommand>();

        let worker = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                match command {
                    QueueCommand::Run(job) => job.await,
                    QueueCommand::Shutdown => break,
                }
            }
            info!("Write queue worker shutting down");
        });

        Self {
            inner: Arc::new(WriteQueueInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    pub async fn execute<Fut, T>(&self, task: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = QueueCommand::Run(Box::pin(async move {
            let result = task.await;
            if reply_tx.send(result).is_err() {
                error!("Write queue caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| StoreError::Other(anyhow!("write queue is shut down")))?;

        reply_rx
            .await
            .map_err(|_| StoreError::Other(anyhow!("write queue worker terminated unexpectedly")))?
    }

    /// Runs everything queued so far, then stops the worker. Later calls to
    /// [`execute`](Self::execute) fail.
    pub async fn shutdown(&self) {
        let handle = {
            let mut guard = match self.inner.worker.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };

        if let Some(handle) = handle {
            if self.inner.sender.send(QueueCommand::Shutdown).is_err() {
                error!("Failed to send shutdown to write queue worker");
            }
            if let Err(join_err) = handle.await {
                error!("Failed to join write queue worker: {join_err:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn jobs_run_in_submission_order_without_overlap() {
        let queue = WriteQueue::start();
        let log = Arc::new(Mutex::new(Vec::new()));

        let (queue_ref, log_ref) = (&queue, &log);
        let job = move |i: u64| {
            let log = Arc::clone(log_ref);
            queue_ref.execute(async move {
                log.lock().unwrap().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(5 - i)).await;
                log.lock().unwrap().push(format!("end {i}"));
                Ok(i)
            })
        };

        // `join!` polls its futures in order, so submission order is 0..5.
        let results = tokio::join!(job(0), job(1), job(2), job(3), job(4));
        assert_eq!(results.4.unwrap(), 4);

        let log = log.lock().unwrap().clone();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {i}"), format!("end {i}")])
            .collect();
        assert_eq!(log, expected);
    }

    #[tokio::test]
    async fn errors_reach_the_caller_and_shutdown_drains() {
        let queue = WriteQueue::start();
        let err = queue
            .execute(async { Err::<(), _>(StoreError::TransientIo("disk busy".into())) })
            .await
            .unwrap_err();
        assert!(err.is_transient());

        queue.shutdown().await;
        assert!(queue.execute(async { Ok(()) }).await.is_err());
    }
}
