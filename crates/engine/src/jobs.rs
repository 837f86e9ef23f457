use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Job = Box<dyn FnOnce(&JobLiveness) + Send + 'static>;

/// Cooperative cancellation flag handed to every job. Jobs should check it
/// before doing expensive work and before publishing results.
#[derive(Debug, Clone)]
pub struct JobLiveness {
    alive: Arc<AtomicBool>,
}

impl JobLiveness {
    fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

pub trait JobExecutor: Send + Sync {
    fn enqueue(&self, job: Job);

    /// Signals every job enqueued so far to stop. Jobs enqueued afterwards
    /// run normally.
    fn cancel(&self);

    /// Blocks until every enqueued job has finished or been skipped.
    fn await_idle(&self);
}

#[derive(Debug, Error)]
pub enum JobExecutorError {
    #[error("failed to spawn job worker {index}: {source}")]
    SpawnWorker {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

struct QueuedJob {
    liveness: JobLiveness,
    job: Job,
}

fn run_queued_job(queued: QueuedJob) {
    let QueuedJob { liveness, job } = queued;
    if !liveness.is_alive() {
        debug!("job_skipped_cancelled");
        return;
    }
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(&liveness))) {
        warn!(panic = %panic_message(payload.as_ref()), "job_panicked");
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn lock_recovered<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct OutstandingJobs {
    count: Mutex<usize>,
    drained: Condvar,
}

impl OutstandingJobs {
    fn begin(&self) {
        let mut count = lock_recovered(&self.count);
        *count = count.saturating_add(1);
    }

    fn finish(&self) {
        let mut count = lock_recovered(&self.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut count = lock_recovered(&self.count);
        while *count > 0 {
            count = self
                .drained
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn current(&self) -> usize {
        *lock_recovered(&self.count)
    }
}

pub struct ThreadPoolExecutor {
    sender: Option<Sender<QueuedJob>>,
    liveness: Mutex<JobLiveness>,
    outstanding: Arc<OutstandingJobs>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    pub fn new(worker_count: usize) -> Result<Self, JobExecutorError> {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<QueuedJob>();
        let outstanding = Arc::new(OutstandingJobs::default());

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = receiver.clone();
            let outstanding = Arc::clone(&outstanding);
            let handle = thread::Builder::new()
                .name(format!("waymark-job-{index}"))
                .spawn(move || worker_loop(receiver, outstanding))
                .map_err(|source| JobExecutorError::SpawnWorker { index, source })?;
            workers.push(handle);
        }
        info!(worker_count, "job_executor_started");

        Ok(Self {
            sender: Some(sender),
            liveness: Mutex::new(JobLiveness::new()),
            outstanding,
            workers,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn outstanding_jobs(&self) -> usize {
        self.outstanding.current()
    }
}

fn worker_loop(receiver: Receiver<QueuedJob>, outstanding: Arc<OutstandingJobs>) {
    for queued in receiver.iter() {
        run_queued_job(queued);
        outstanding.finish();
    }
}

impl JobExecutor for ThreadPoolExecutor {
    fn enqueue(&self, job: Job) {
        let liveness = lock_recovered(&self.liveness).clone();
        let Some(sender) = self.sender.as_ref() else {
            warn!("job_rejected_executor_closed");
            return;
        };
        self.outstanding.begin();
        if sender.send(QueuedJob { liveness, job }).is_err() {
            self.outstanding.finish();
            warn!("job_rejected_executor_closed");
        }
    }

    fn cancel(&self) {
        let mut liveness = lock_recovered(&self.liveness);
        liveness.kill();
        *liveness = JobLiveness::new();
        info!(outstanding = self.outstanding.current(), "jobs_cancelled");
    }

    fn await_idle(&self) {
        self.outstanding.wait_drained();
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("job_worker_join_failed");
            }
        }
        debug!("job_executor_stopped");
    }
}

/// Holds jobs until [`ManualExecutor::run_pending`]; deterministic stand-in
/// for the thread pool.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<Vec<QueuedJob>>,
    liveness: Mutex<Option<JobLiveness>>,
    enqueued_total: AtomicU64,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        lock_recovered(&self.queue).len()
    }

    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::SeqCst)
    }

    /// Runs queued jobs in submission order and returns how many were taken.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *lock_recovered(&self.queue));
        let count = jobs.len();
        for queued in jobs {
            run_queued_job(queued);
        }
        count
    }

    fn current_liveness(&self) -> JobLiveness {
        lock_recovered(&self.liveness)
            .get_or_insert_with(JobLiveness::new)
            .clone()
    }
}

impl JobExecutor for ManualExecutor {
    fn enqueue(&self, job: Job) {
        let liveness = self.current_liveness();
        self.enqueued_total.fetch_add(1, Ordering::SeqCst);
        lock_recovered(&self.queue).push(QueuedJob { liveness, job });
    }

    fn cancel(&self) {
        if let Some(liveness) = lock_recovered(&self.liveness).take() {
            liveness.kill();
        }
    }

    fn await_idle(&self) {
        while self.run_pending() > 0 {}
    }
}
