//! Asynchronous indexing pipeline
//!
//! A fixed worker pool consumes a bounded job channel. When the channel is
//! full the enqueueing caller runs the job itself (caller-runs
//! backpressure). Every job is tracked in a concurrent task map keyed by
//! accession; terminal tasks are evicted an hour after finishing. Enqueue
//! fails fast while the messaging transport is down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use biostudies_search_core::{TaskState, TaskStatus};
use biostudies_search_engine::SearchService;

use crate::backend::{FetchOutcome, StreamFilters, SubmissionBackend};
use crate::error::{ServiceError, ServiceResult};
use crate::messaging::MessagingHealth;

/// How long `await_completion` waits for the queue to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5 * 60 * 60);

/// Sweep interval for expired task records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Worker poll interval while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receipt returned on enqueue.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedTask {
    #[serde(rename = "accNo")]
    pub acc_no: String,
    #[serde(rename = "queuePosition")]
    pub queue_position: usize,
    #[serde(rename = "taskId")]
    pub task_id: Uuid,
    #[serde(rename = "statusUrl")]
    pub status_url: String,
}

#[derive(Debug)]
enum Job {
    Submission {
        acc_no: String,
        remove_files: bool,
        commit: bool,
    },
    Stream {
        stream_id: String,
        filters: StreamFilters,
        page_size: usize,
    },
}

impl Job {
    fn key(&self) -> &str {
        match self {
            Self::Submission { acc_no, .. } => acc_no,
            Self::Stream { stream_id, .. } => stream_id,
        }
    }
}

struct Inner {
    search: Arc<SearchService>,
    backend: Arc<dyn SubmissionBackend>,
    health: Arc<dyn MessagingHealth>,
    sender: Sender<Job>,
    tasks: DashMap<String, TaskStatus>,
    active: AtomicUsize,
    stop: AtomicBool,
}

impl Inner {
    fn run_job(&self, job: Job) {
        self.active.fetch_add(1, Ordering::SeqCst);
        let key = job.key().to_string();
        if let Some(mut task) = self.tasks.get_mut(&key) {
            task.start();
        }

        let outcome = match &job {
            Job::Submission {
                acc_no,
                remove_files,
                commit,
            } => self.run_submission(acc_no, *remove_files, *commit),
            Job::Stream {
                filters, page_size, ..
            } => self.run_stream(filters, *page_size),
        };

        let (state, message) = match outcome {
            Ok(state) => (state, None),
            Err(e) => {
                error!(task = %key, error = %e, "indexing task failed");
                (TaskState::Failed, Some(e.to_string()))
            }
        };
        if let Some(mut task) = self.tasks.get_mut(&key) {
            task.finish(state, message);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn run_submission(
        &self,
        acc_no: &str,
        remove_files: bool,
        commit: bool,
    ) -> ServiceResult<TaskState> {
        match self.backend.fetch_extended(acc_no)? {
            FetchOutcome::Found(submission) => {
                if commit {
                    self.search.indexer().index_one(&submission)?;
                } else {
                    self.search
                        .indexer()
                        .index_without_commit(&submission, remove_files)?;
                }
                Ok(TaskState::Completed)
            }
            FetchOutcome::NotFound => {
                // Tombstone: remove whatever we had.
                self.search.indexer().delete_submission(acc_no)?;
                Ok(TaskState::NotFound)
            }
        }
    }

    fn run_stream(&self, filters: &StreamFilters, page_size: usize) -> ServiceResult<TaskState> {
        let mut offset = 0usize;
        loop {
            let page = self.backend.fetch_page(filters, offset, page_size)?;
            if page.is_empty() {
                break;
            }
            for submission in &page {
                if let Err(e) = self.search.indexer().index_without_commit(submission, true) {
                    warn!(error = %e, "submission skipped in stream");
                }
            }
            // One commit per page.
            self.search.txn().commit()?;
            self.search.manager().refresh_all();
            debug!(offset, indexed = page.len(), "stream page committed");

            let fetched = page.len();
            offset += fetched;
            if fetched < page_size {
                break;
            }
        }
        Ok(TaskState::Completed)
    }

    fn queue_depth(&self) -> usize {
        self.sender.len()
    }
}

/// The pipeline: worker pool, bounded queue, task map, TTL sweeper.
pub struct IndexingService {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl IndexingService {
    /// Spawn workers and the task sweeper. Worker count and queue bound
    /// come from the engine's configuration.
    #[must_use]
    pub fn new(
        search: Arc<SearchService>,
        backend: Arc<dyn SubmissionBackend>,
        health: Arc<dyn MessagingHealth>,
    ) -> Self {
        let thread_count = search.config().indexer_thread_count.max(1);
        let capacity = search.config().indexer_queue_capacity.max(1);
        let (sender, receiver): (Sender<Job>, Receiver<Job>) =
            crossbeam_channel::bounded(capacity);

        let inner = Arc::new(Inner {
            search,
            backend,
            health,
            sender,
            tasks: DashMap::new(),
            active: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        });

        let workers = (0..thread_count)
            .map(|i| {
                let inner = Arc::clone(&inner);
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("indexer-{i}"))
                    .spawn(move || worker_loop(&inner, &receiver))
                    .expect("spawn indexing worker")
            })
            .collect();

        let sweeper = {
            let inner = Arc::clone(&inner);
            std::thread::Builder::new()
                .name("task-sweeper".to_string())
                .spawn(move || sweeper_loop(&inner))
                .expect("spawn task sweeper")
        };

        info!(thread_count, capacity, "indexing service started");
        Self {
            inner,
            workers,
            sweeper: Some(sweeper),
        }
    }

    /// Queue one submission for fetch-and-index.
    pub fn queue_submission(
        &self,
        acc_no: &str,
        remove_files: bool,
        commit: bool,
    ) -> ServiceResult<QueuedTask> {
        let acc_no = acc_no.trim();
        if acc_no.is_empty() {
            return Err(ServiceError::InvalidAccession(acc_no.to_string()));
        }
        let job = Job::Submission {
            acc_no: acc_no.to_string(),
            remove_files,
            commit,
        };
        self.enqueue(job, format!("/submissions/{acc_no}/status"))
    }

    /// Queue a streamed paginated re-index over backend filters.
    pub fn queue_stream(
        &self,
        filters: StreamFilters,
        page_size: usize,
    ) -> ServiceResult<QueuedTask> {
        let stream_id = format!("stream-{}", Uuid::new_v4());
        let job = Job::Stream {
            stream_id: stream_id.clone(),
            filters,
            page_size: page_size.max(1),
        };
        self.enqueue(job, format!("/submissions/{stream_id}/status"))
    }

    fn enqueue(&self, job: Job, status_url: String) -> ServiceResult<QueuedTask> {
        if !self.inner.health.is_open() {
            return Err(ServiceError::Unavailable(
                "messaging transport closed".to_string(),
            ));
        }

        let key = job.key().to_string();
        let task = TaskStatus::queued(&key);
        let task_id = task.task_id;
        let queue_position =
            self.inner.active.load(Ordering::SeqCst) + self.inner.queue_depth() + 1;
        self.inner.tasks.insert(key.clone(), task);

        match self.inner.sender.try_send(job) {
            Ok(()) => {}
            // Caller-runs backpressure: a full queue makes the enqueueing
            // thread do the work, throttling producers naturally.
            Err(TrySendError::Full(job)) => {
                debug!(task = %key, "queue full; running on caller");
                self.inner.run_job(job);
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(ServiceError::Unavailable("worker pool stopped".to_string()));
            }
        }

        Ok(QueuedTask {
            acc_no: key,
            queue_position,
            task_id,
            status_url,
        })
    }

    /// Task status for an accession; a NOT_FOUND stub after eviction.
    #[must_use]
    pub fn status(&self, acc_no: &str) -> TaskStatus {
        self.inner
            .tasks
            .get(acc_no)
            .map_or_else(|| TaskStatus::not_found(acc_no), |entry| entry.clone())
    }

    /// All known tasks, newest first.
    #[must_use]
    pub fn tasks(&self) -> Vec<TaskStatus> {
        let mut tasks: Vec<TaskStatus> = self
            .inner
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        tasks
    }

    /// Number of running plus queued jobs.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst) + self.inner.queue_depth()
    }

    /// Wait for the queue to drain, then issue a final commit and refresh.
    pub fn await_completion(&self) -> ServiceResult<()> {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                return Err(ServiceError::DrainTimeout(DRAIN_TIMEOUT));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        self.inner.search.txn().commit()?;
        self.inner.search.manager().refresh_all();
        Ok(())
    }

    /// Stop workers and the sweeper. Queued jobs that no worker picked up
    /// before the stop flag was observed are dropped.
    pub fn shutdown(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IndexingService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &Inner, receiver: &Receiver<Job>) {
    while !inner.stop.load(Ordering::SeqCst) {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => inner.run_job(job),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn sweeper_loop(inner: &Inner) {
    let mut last_sweep = Instant::now();
    while !inner.stop.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
        if last_sweep.elapsed() < SWEEP_INTERVAL {
            continue;
        }
        let now = Utc::now();
        inner.tasks.retain(|_, task| !task.is_expired(now));
        last_sweep = Instant::now();
    }
}
