//! Sequential batch processing.
//!
//! Jobs move `Waiting -> Processing -> Done | Error` and never leave a terminal
//! state. One drain loop runs at a time and processes one job at a time, so at
//! most one full-resolution image is being transformed at any moment.
//!
//! Clearing the queue while a job is `Processing` removes it from the queue at
//! once. The in-flight transform still runs to completion; its outcome is not
//! written back into the queue, but a successful result is still handed to the
//! [`ResultSink`] and so reaches history.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::engine::ImageProcessor;
use crate::thumbnail::ThumbnailSpec;

/// A named, encoded image handed over by the input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Declared file name.
    pub name: String,
    /// Encoded image bytes.
    pub bytes: Bytes,
}

impl ImageInput {
    /// Pair a name with its encoded bytes.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Declared size in bytes.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}

/// Identifier of a queued job, increasing in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued, not started.
    Waiting,
    /// Being transformed.
    Processing,
    /// Finished with a result.
    Done,
    /// Failed; never retried.
    Error,
}

impl JobStatus {
    /// `Done` and `Error` admit no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One unit of batch work.
#[derive(Debug, Clone)]
pub struct Job {
    /// Queue-unique id.
    pub id: JobId,
    /// Declared file name.
    pub name: String,
    /// Encoded input.
    pub source: Bytes,
    /// Current status.
    pub status: JobStatus,
    /// Encoded output, present iff `Done`.
    pub result: Option<Bytes>,
    /// Preview of the source, replaced by a preview of the result once `Done`.
    pub thumbnail: Option<Bytes>,
    /// Failure detail, present iff `Error`.
    pub error: Option<String>,
}

impl Job {
    /// Size of the result when done, otherwise of the source.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.result.as_ref().unwrap_or(&self.source).len()
    }
}

/// Receives every successful batch result.
pub trait ResultSink: Send + Sync {
    /// Called once per job that finished `Done`, outside the queue lock.
    fn job_completed(&self, name: &str, result: &Bytes, source: &Bytes);
}

#[derive(Default)]
struct QueueState {
    jobs: Vec<Job>,
    next_id: u64,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// FIFO queue drained one job at a time through an [`ImageProcessor`].
pub struct BatchQueue {
    processor: Arc<dyn ImageProcessor>,
    sink: Option<Arc<dyn ResultSink>>,
    thumbnails: ThumbnailSpec,
    state: Mutex<QueueState>,
    draining: AtomicBool,
}

impl BatchQueue {
    /// An empty queue feeding `processor`.
    pub fn new(processor: Arc<dyn ImageProcessor>) -> Self {
        Self {
            processor,
            sink: None,
            thumbnails: ThumbnailSpec::default(),
            state: Mutex::new(QueueState::default()),
            draining: AtomicBool::new(false),
        }
    }

    /// Hand successful results to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Derive job thumbnails with `spec`.
    #[must_use]
    pub fn with_thumbnails(mut self, spec: ThumbnailSpec) -> Self {
        self.thumbnails = spec;
        self
    }

    /// Append one `Waiting` job per image, in order.
    ///
    /// Each job starts with a preview of its source; sources that cannot be
    /// decoded get none and fail when processed.
    pub fn enqueue(&self, images: impl IntoIterator<Item = ImageInput>) -> Vec<JobId> {
        let previews: Vec<(ImageInput, Option<Bytes>)> = images
            .into_iter()
            .map(|image| {
                let preview = match self.thumbnails.generate(&image.bytes) {
                    Ok(thumb) => Some(Bytes::from(thumb)),
                    Err(e) => {
                        debug!("no preview for {}: {e}", image.name);
                        None
                    }
                };
                (image, preview)
            })
            .collect();

        let mut state = self.state.lock();
        let mut ids = Vec::with_capacity(previews.len());
        for (image, thumbnail) in previews {
            let id = JobId(state.next_id);
            state.next_id += 1;
            state.jobs.push(Job {
                id,
                name: image.name,
                source: image.bytes,
                status: JobStatus::Waiting,
                result: None,
                thumbnail,
                error: None,
            });
            ids.push(id);
        }
        debug!("enqueued {} jobs, {} in queue", ids.len(), state.jobs.len());
        ids
    }

    /// Process `Waiting` jobs in enqueue order until none remain.
    ///
    /// Returns immediately with 0 if another drain is already running; that
    /// drain will pick up any jobs enqueued in the meantime. Otherwise returns
    /// the number of jobs this call processed.
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let Some(guard) = DrainGuard::acquire(&self.draining) else {
                return processed;
            };
            while let Some(job) = self.start_next() {
                self.run(&job);
                processed += 1;
            }
            drop(guard);

            // A job enqueued between the last check and the release would
            // otherwise wait for the next trigger.
            if !self.has_waiting() {
                return processed;
            }
        }
    }

    fn start_next(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .iter_mut()
            .find(|j| j.status == JobStatus::Waiting)?;
        job.status = JobStatus::Processing;
        debug!("processing job {} ({})", job.id, job.name);
        Some(job.clone())
    }

    fn run(&self, job: &Job) {
        match self.processor.process(&job.source) {
            Ok(output) => {
                let result = Bytes::from(output);
                let thumbnail = match self.thumbnails.generate(&result) {
                    Ok(thumb) => Some(Bytes::from(thumb)),
                    Err(e) => {
                        warn!("thumbnail for job {} failed, keeping source preview: {e}", job.id);
                        None
                    }
                };

                let queued = self.update(job.id, |j| {
                    j.status = JobStatus::Done;
                    j.result = Some(result.clone());
                    if thumbnail.is_some() {
                        j.thumbnail = thumbnail;
                    }
                });
                if !queued {
                    debug!("job {} was cleared while processing", job.id);
                }
                info!("job {} ({}) done, {} bytes", job.id, job.name, result.len());

                if let Some(sink) = &self.sink {
                    sink.job_completed(&job.name, &result, &job.source);
                }
            }
            Err(e) => {
                warn!("job {} ({}) failed: {e}", job.id, job.name);
                self.update(job.id, |j| {
                    j.status = JobStatus::Error;
                    j.error = Some(e.to_string());
                });
            }
        }
    }

    /// Apply `f` to the job if it is still queued.
    fn update(&self, id: JobId, f: impl FnOnce(&mut Job)) -> bool {
        let mut state = self.state.lock();
        match state.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Discard every job; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.jobs.len();
        state.jobs.clear();
        debug!("cleared {removed} jobs");
        removed
    }

    /// Snapshot of all jobs in enqueue order.
    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().jobs.clone()
    }

    /// Snapshot of one job.
    #[must_use]
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.state.lock().jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Number of jobs in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether the queue holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    /// Whether a drain loop is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Whether any job is still `Waiting`.
    #[must_use]
    pub fn has_waiting(&self) -> bool {
        self.state
            .lock()
            .jobs
            .iter()
            .any(|j| j.status == JobStatus::Waiting)
    }

    /// Whether any job finished `Done`.
    #[must_use]
    pub fn has_done(&self) -> bool {
        self.state
            .lock()
            .jobs
            .iter()
            .any(|j| j.status == JobStatus::Done)
    }

    /// Name and result of every `Done` job, in enqueue order.
    #[must_use]
    pub fn done_results(&self) -> Vec<(String, Bytes)> {
        self.state
            .lock()
            .jobs
            .iter()
            .filter_map(|j| j.result.clone().map(|r| (j.name.clone(), r)))
            .collect()
    }
}
