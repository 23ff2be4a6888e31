use tokio::sync::mpsc;

use crate::services::storage::TempUpload;

/// Work item handed to the import workers.
#[derive(Debug)]
pub struct ImportTask {
    pub job_id: i64,
    pub upload: TempUpload,
}

/// Bounded in-process queue of pending imports.
///
/// Submitters reserve a slot before creating their job, so a full queue is
/// reported without leaving an orphaned PENDING job behind.
#[derive(Debug, Clone)]
pub struct ImportQueue {
    sender: mpsc::Sender<ImportTask>,
}

impl ImportQueue {
    pub(crate) fn new(sender: mpsc::Sender<ImportTask>) -> Self {
        Self { sender }
    }

    /// Reserve room for one task without waiting.
    pub fn reserve(&self) -> Result<QueueSlot, QueueError> {
        match self.sender.clone().try_reserve_owned() {
            Ok(permit) => Ok(QueueSlot { permit }),
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Wait for room for one task. Used for recovery at startup where blocking
    /// is preferable to refusing work.
    pub async fn reserve_wait(&self) -> Result<QueueSlot, QueueError> {
        self.sender
            .clone()
            .reserve_owned()
            .await
            .map(|permit| QueueSlot { permit })
            .map_err(|_| QueueError::Closed)
    }

    /// Tasks queued or reserved but not yet picked up by a worker.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Check the workers are still accepting tasks (for health checks).
    pub fn health_check(&self) -> Result<(), QueueError> {
        if self.sender.is_closed() {
            Err(QueueError::Closed)
        } else {
            Ok(())
        }
    }
}

/// A reserved place in the queue.
#[derive(Debug)]
pub struct QueueSlot {
    permit: mpsc::OwnedPermit<ImportTask>,
}

impl QueueSlot {
    pub fn enqueue(self, task: ImportTask) {
        let job_id = task.job_id;
        self.permit.send(task);
        tracing::debug!(job_id, "Import queued");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Import queue is full, try again later")]
    Full,

    #[error("Import queue is shut down")]
    Closed,
}
