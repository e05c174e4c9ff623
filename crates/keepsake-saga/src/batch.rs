//! Concurrent batch blob uploads.
//!
//! The executor fans out every upload at once and never short-circuits:
//! even when one blob fails early, the remaining attempts run to
//! completion so the caller learns exactly which keys made it to storage.
//! Compensation depends on that precision; a short-circuited batch would
//! leave uploads in flight with nobody left to delete them.

use std::collections::HashMap;
use std::sync::Arc;

use keepsake_core::{BlobStore, Result};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::retry::RetryPolicy;

/// One upload the executor has been asked to perform.
pub struct UploadJob {
    /// Destination blob key.
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// The settled fate of a single upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub size_bytes: i64,
    pub content_type: String,
    /// `None` when the blob is in storage.
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Settled outcomes for a whole batch, in input order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(UploadOutcome::succeeded)
    }

    /// Outcomes whose blob reached storage.
    pub fn uploaded(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploaded().map(|o| o.key.clone()).collect()
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.key.clone())
            .collect()
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}

/// Uploads batches of blobs concurrently and reports settled outcomes.
pub struct BatchUploadExecutor {
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
}

impl BatchUploadExecutor {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload every job concurrently and wait for all of them to settle.
    ///
    /// The report preserves input order regardless of completion order.
    pub async fn upload_all(&self, jobs: Vec<UploadJob>) -> BatchReport {
        let mut outcomes: Vec<UploadOutcome> = Vec::with_capacity(jobs.len());
        let mut tasks = JoinSet::new();
        let mut index_by_task = HashMap::new();

        for (index, job) in jobs.into_iter().enumerate() {
            // Placeholder outcome; overwritten when the task settles. A
            // panicked task leaves it marked failed, which errs toward
            // compensation never missing an uploaded blob.
            outcomes.push(UploadOutcome {
                key: job.key.clone(),
                size_bytes: job.bytes.len() as i64,
                content_type: job.content_type.clone(),
                error: Some("upload did not settle".to_string()),
            });

            let blobs = Arc::clone(&self.blobs);
            let retry = self.retry;
            let handle =
                tasks.spawn(async move { upload_with_retry(blobs.as_ref(), &job, retry).await });
            index_by_task.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    let index = index_by_task[&id];
                    outcomes[index].error = result.err().map(|e| e.to_string());
                }
                Err(join_err) => {
                    let index = index_by_task[&join_err.id()];
                    error!(
                        blob_key = %outcomes[index].key,
                        error = ?join_err,
                        "Upload task panicked"
                    );
                    outcomes[index].error = Some("upload task panicked".to_string());
                }
            }
        }

        let report = BatchReport { outcomes };
        debug!(
            batch_size = report.attempted(),
            failed = report.failed_keys().len(),
            "Upload batch settled"
        );
        report
    }
}

async fn upload_with_retry(
    blobs: &dyn BlobStore,
    job: &UploadJob,
    retry: RetryPolicy,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match blobs.put(&job.key, &job.bytes, &job.content_type).await {
            Ok(()) => {
                if attempt > 1 {
                    debug!(blob_key = %job.key, attempt, "Upload succeeded after retry");
                }
                return Ok(());
            }
            Err(e) if attempt < retry.max_attempts => {
                warn!(
                    blob_key = %job.key,
                    attempt,
                    error = %e,
                    "Upload attempt failed, retrying"
                );
                tokio::time::sleep(retry.backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
