use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::IndexingError;
use crate::model::{TaskId, VideoHandle};
use crate::video::client::{IndexingState, IndexingStatus, VideoBackend};

/// Submits videos for indexing and waits until they can be analyzed
pub struct VideoIndexer {
    backend: Arc<dyn VideoBackend>,
    index_id: String,
    poll_interval: Duration,
    poll_budget: Duration,
}

impl VideoIndexer {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        index_id: impl Into<String>,
        poll_interval: Duration,
        poll_budget: Duration,
    ) -> Self {
        VideoIndexer {
            backend,
            index_id: index_id.into(),
            poll_interval,
            poll_budget,
        }
    }

    /// Submit a fresh indexing task. Nothing is cached per URL.
    pub async fn submit(&self, video_url: &str) -> Result<TaskId, IndexingError> {
        let task_id = self
            .backend
            .create_task(&self.index_id, video_url)
            .await
            .map_err(|e| IndexingError::Submit(e.to_string()))?;
        info!("Submitted {} for indexing as task {}", video_url, task_id);
        Ok(task_id)
    }

    /// Status updates for a task, one per poll.
    ///
    /// The first check happens immediately, later ones after the poll
    /// interval. The stream ends after the first terminal status or after
    /// a failed status check, which is yielded as the last item. Dropping
    /// the stream stops polling.
    pub fn watch(&self, task_id: TaskId) -> BoxStream<'static, Result<IndexingStatus, IndexingError>> {
        let backend = self.backend.clone();
        let interval = self.poll_interval;

        stream::unfold(Some((task_id, true)), move |state| {
            let backend = backend.clone();
            async move {
                let (task_id, first) = state?;
                if !first {
                    tokio::time::sleep(interval).await;
                }

                match backend.task_status(&task_id).await {
                    Ok(status) => {
                        let next = if status.state.is_terminal() {
                            None
                        } else {
                            Some((task_id, false))
                        };
                        Some((Ok(status), next))
                    }
                    Err(e) => {
                        let err = IndexingError::Poll {
                            task_id: task_id.to_string(),
                            reason: e.to_string(),
                        };
                        Some((Err(err), None))
                    }
                }
            }
        })
        .boxed()
    }

    /// Wait for a task to become ready, within the polling budget.
    pub async fn wait_ready(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<VideoHandle, IndexingError> {
        let mut updates = self.watch(task_id.clone());

        let wait = async {
            while let Some(update) = updates.next().await {
                let status = update?;
                debug!("Indexing task {} is {}", status.task_id, status.raw_status);

                match status.state {
                    IndexingState::Ready => {
                        return status.video_id.map(VideoHandle).ok_or_else(|| {
                            IndexingError::MissingVideoId {
                                task_id: task_id.to_string(),
                            }
                        });
                    }
                    IndexingState::Failed => {
                        return Err(IndexingError::Terminal {
                            status: status.raw_status,
                        });
                    }
                    IndexingState::Queued | IndexingState::Processing => {}
                }
            }

            Err(IndexingError::Poll {
                task_id: task_id.to_string(),
                reason: "status updates ended before a terminal status".to_string(),
            })
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Stopped waiting for indexing task {}", task_id);
                Err(IndexingError::Cancelled)
            }

            _ = tokio::time::sleep(self.poll_budget) => {
                warn!("Indexing task {} timed out after {:?}", task_id, self.poll_budget);
                Err(IndexingError::TimedOut(self.poll_budget))
            }

            result = wait => result,
        }
    }

    /// Submit `video_url` and wait until its video handle is ready
    pub async fn index_and_wait(
        &self,
        video_url: &str,
        cancel: &CancellationToken,
    ) -> Result<VideoHandle, IndexingError> {
        let task_id = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Err(IndexingError::Cancelled),
            result = self.submit(video_url) => result?,
        };

        let handle = self.wait_ready(&task_id, cancel).await?;
        info!("Video {} is indexed as {}", video_url, handle);
        Ok(handle)
    }
}
