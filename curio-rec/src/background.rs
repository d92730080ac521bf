//! Background Worker
//!
//! A single dedicated task that performs work the request path must never
//! wait for: cache population, alias linking, embedding warm-up, popularity
//! counters and idle eviction.
//!
//! Submission is fire-and-forget. Jobs run one at a time in submission
//! order; a failed job is logged and dropped, never retried and never
//! reported back to the submitter.

use crate::cache::AliasCache;
use crate::db::PreferenceStore;
use crate::embeddings::EmbeddingIndex;
use curio_common::{ContentType, MetadataRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Unit of background work
#[derive(Debug, Clone)]
pub enum BackgroundJob {
    /// `AliasCache::put_many` for freshly resolved records
    PopulateCache {
        records: Vec<MetadataRecord>,
        content_type: ContentType,
    },
    /// `AliasCache::link_alias` for divergent spellings
    LinkAliases {
        pairs: Vec<(String, String)>,
        content_type: ContentType,
    },
    /// Embed and store records so later rankings can reuse their vectors
    WarmEmbeddings {
        records: Vec<MetadataRecord>,
        content_type: ContentType,
    },
    /// Increment recommendation counters
    RecordPopularity {
        titles: Vec<String>,
        content_type: ContentType,
    },
    /// `AliasCache::evict_idle`
    EvictIdle {
        prefix: String,
        threshold_percent: f64,
        cleanup_percent: f64,
        max_capacity: u64,
    },
}

impl BackgroundJob {
    fn kind(&self) -> &'static str {
        match self {
            BackgroundJob::PopulateCache { .. } => "populate_cache",
            BackgroundJob::LinkAliases { .. } => "link_aliases",
            BackgroundJob::WarmEmbeddings { .. } => "warm_embeddings",
            BackgroundJob::RecordPopularity { .. } => "record_popularity",
            BackgroundJob::EvictIdle { .. } => "evict_idle",
        }
    }
}

/// Completed/failed job counters
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl WorkerStats {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Submission side of the worker; cheap to clone
#[derive(Clone)]
pub struct BackgroundHandle {
    sender: mpsc::UnboundedSender<BackgroundJob>,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    stats: Arc<WorkerStats>,
}

impl BackgroundHandle {
    /// Queue a job; never blocks and never fails
    pub fn submit(&self, job: BackgroundJob) {
        let kind = job.kind();
        if self.sender.send(job).is_err() {
            warn!(job = kind, "Background worker stopped, job dropped");
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Finish already-queued jobs, then stop the worker
    ///
    /// Idempotent; later calls return immediately.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Background worker ended abnormally");
            }
        }
    }
}

/// Dependencies of the background lane
pub struct BackgroundWorker {
    cache: AliasCache,
    embeddings: Option<EmbeddingIndex>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    stats: Arc<WorkerStats>,
}

impl BackgroundWorker {
    /// Start the worker task
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(
        cache: AliasCache,
        embeddings: Option<EmbeddingIndex>,
        preferences: Option<Arc<dyn PreferenceStore>>,
    ) -> BackgroundHandle {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stats = Arc::new(WorkerStats::default());

        let worker = BackgroundWorker {
            cache,
            embeddings,
            preferences,
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(worker.run(receiver, cancel.clone()));

        BackgroundHandle {
            sender,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
            stats,
        }
    }

    async fn run(self, mut receiver: mpsc::UnboundedReceiver<BackgroundJob>, cancel: CancellationToken) {
        debug!("Background worker started");

        loop {
            tokio::select! {
                biased;
                job = receiver.recv() => match job {
                    Some(job) => self.execute(job).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    // Drain what was queued before shutdown
                    while let Ok(job) = receiver.try_recv() {
                        self.execute(job).await;
                    }
                    break;
                }
            }
        }

        info!(
            completed = self.stats.completed(),
            failed = self.stats.failed(),
            "Background worker stopped"
        );
    }

    async fn execute(&self, job: BackgroundJob) {
        let kind = job.kind();
        match self.perform(job).await {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(message) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(job = kind, error = %message, "Background job failed");
            }
        }
    }

    async fn perform(&self, job: BackgroundJob) -> Result<(), String> {
        match job {
            BackgroundJob::PopulateCache { records, content_type } => {
                let written = self.cache.put_many(&records, content_type, None).await;
                debug!(content_type = %content_type, offered = records.len(), written, "Populated cache");
            }
            BackgroundJob::LinkAliases { pairs, content_type } => {
                let linked = self.cache.link_alias(&pairs, content_type).await;
                debug!(content_type = %content_type, linked, "Linked aliases");
            }
            BackgroundJob::WarmEmbeddings { records, content_type } => {
                let Some(index) = &self.embeddings else {
                    return Ok(());
                };
                let stored = index
                    .store_records(content_type, &records)
                    .await
                    .map_err(|e| e.to_string())?;
                debug!(content_type = %content_type, stored, "Warmed embeddings");
            }
            BackgroundJob::RecordPopularity { titles, content_type } => {
                let Some(store) = &self.preferences else {
                    return Ok(());
                };
                store
                    .record_popularity(&titles, content_type)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            BackgroundJob::EvictIdle {
                prefix,
                threshold_percent,
                cleanup_percent,
                max_capacity,
            } => {
                let report = self
                    .cache
                    .evict_idle(&prefix, threshold_percent, cleanup_percent, max_capacity)
                    .await
                    .map_err(|e| e.to_string())?;
                debug!(prefix = %prefix, deleted = report.deleted, "Eviction pass finished");
            }
        }
        Ok(())
    }
}
