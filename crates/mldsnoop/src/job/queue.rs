// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FIFO job queue drained by a fixed pool of worker threads.
//!
//! # Architecture
//!
//! ```text
//! push() -> [fifo lock] VecDeque::push_back -> jobs.post()
//!                                                 |
//! worker N: jobs.wait() -> [fifo lock] pop_front -> run -> mark done -> callback
//! ```
//!
//! Start order follows push order across the whole queue. Completion order
//! is not guaranteed once more than one worker is running.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::semaphore::Semaphore;

type Work = Box<dyn FnOnce() + Send + 'static>;
type Callback = Box<dyn FnOnce(&Job) + Send + 'static>;

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued or running.
    Pending,
    /// Ran to completion (or panicked; the panic is logged).
    Done,
    /// Dropped unexecuted by a queue shutdown.
    Discarded,
}

/// A unit of work plus its completion latch.
pub struct Job {
    work: Mutex<Option<Work>>,
    callback: Mutex<Option<Callback>>,
    state: Mutex<JobState>,
    cond: Condvar,
}

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            work: Mutex::new(Some(Box::new(f))),
            callback: Mutex::new(None),
            state: Mutex::new(JobState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Attach a callback invoked on the worker after the job finishes.
    #[must_use]
    pub fn with_callback<C>(self, cb: C) -> Self
    where
        C: FnOnce(&Job) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(cb));
        self
    }

    pub fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub fn is_done(&self) -> bool {
        self.state() == JobState::Done
    }

    /// Block until the job leaves [`JobState::Pending`].
    pub fn wait(&self) -> JobState {
        let mut state = self.state.lock();
        while *state == JobState::Pending {
            self.cond.wait(&mut state);
        }
        *state
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> JobState {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state == JobState::Pending {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }

    fn run(&self) {
        let work = self.work.lock().take();
        if let Some(work) = work {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work)) {
                log::error!("[job] job panicked: {:?}", e);
            }
        }
        self.finish(JobState::Done);

        let callback = self.callback.lock().take();
        if let Some(cb) = callback {
            cb(self);
        }
    }

    fn discard(&self) {
        // Drop captured state now rather than whenever the last handle goes.
        drop(self.work.lock().take());
        drop(self.callback.lock().take());
        self.finish(JobState::Discarded);
    }

    fn finish(&self, to: JobState) {
        let mut state = self.state.lock();
        *state = to;
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("state", &self.state()).finish()
    }
}

struct Shared {
    fifo: Mutex<VecDeque<Arc<Job>>>,
    jobs: Semaphore,
    shutdown: AtomicBool,
}

impl Shared {
    fn pop(&self) -> Option<Arc<Job>> {
        self.fifo.lock().pop_front()
    }

    fn wait_shift(&self) -> Option<Arc<Job>> {
        loop {
            self.jobs.wait();
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            // A permit can outlive its job when shift() popped it directly.
            if let Some(job) = self.pop() {
                return Some(job);
            }
        }
    }
}

/// Work queue with a fixed worker pool.
///
/// Dropping the queue discards pending jobs and joins the workers. A worker
/// in the middle of a job finishes it first, so long-running jobs must watch
/// their own stop signal.
pub struct JobQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Spawn `n` workers named `mld-worker-<i>`.
    pub fn new(n: usize) -> io::Result<Self> {
        let queue = Self {
            shared: Arc::new(Shared {
                fifo: Mutex::new(VecDeque::new()),
                jobs: Semaphore::new(0),
                shutdown: AtomicBool::new(false),
            }),
            workers: Mutex::new(Vec::with_capacity(n)),
        };

        for i in 0..n {
            let shared = Arc::clone(&queue.shared);
            let handle = thread::Builder::new()
                .name(format!("mld-worker-{}", i))
                .spawn(move || worker_loop(&shared, i))?;
            // On error `queue` drops here and joins what was spawned.
            queue.workers.lock().push(handle);
        }

        log::debug!("[job] queue started with {} workers", n);
        Ok(queue)
    }

    /// Append a job and wake one worker.
    pub fn push(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        {
            let mut fifo = self.shared.fifo.lock();
            if self.shared.shutdown.load(Ordering::Acquire) {
                drop(fifo);
                log::debug!("[job] push after shutdown, discarding");
                job.discard();
                return job;
            }
            fifo.push_back(Arc::clone(&job));
        }
        self.shared.jobs.post();
        job
    }

    /// Push a closure.
    pub fn push_new<F>(&self, f: F) -> Arc<Job>
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Job::new(f))
    }

    /// Push a closure with a completion callback.
    pub fn push_with_callback<F, C>(&self, f: F, cb: C) -> Arc<Job>
    where
        F: FnOnce() + Send + 'static,
        C: FnOnce(&Job) + Send + 'static,
    {
        self.push(Job::new(f).with_callback(cb))
    }

    /// Push a closure that receives its own clone of `arg`.
    ///
    /// The caller keeps `arg` and may change it freely; the job's copy is
    /// dropped after execution or when the job is discarded.
    pub fn push_copy<T, F>(&self, arg: &T, f: F) -> Arc<Job>
    where
        T: Clone + Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let owned = arg.clone();
        self.push_new(move || f(owned))
    }

    /// Pop the head job without waiting.
    ///
    /// The popped job is not run; the caller owns it.
    pub fn shift(&self) -> Option<Arc<Job>> {
        self.shared.pop()
    }

    /// Pop the head job only if a permit is available right now.
    pub fn try_shift(&self) -> Option<Arc<Job>> {
        if self.shared.jobs.try_wait() {
            self.shared.pop()
        } else {
            None
        }
    }

    /// Block until a job is available. Returns `None` after shutdown.
    pub fn wait_shift(&self) -> Option<Arc<Job>> {
        self.shared.wait_shift()
    }

    /// Jobs waiting to start.
    pub fn len(&self) -> usize {
        self.shared.fifo.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn workers(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Discard pending jobs, then wake and join every worker.
    ///
    /// Safe to call from a worker: that worker is not joined.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);

        let discarded: Vec<Arc<Job>> = self.shared.fifo.lock().drain(..).collect();
        if !discarded.is_empty() {
            log::debug!("[job] discarding {} pending jobs", discarded.len());
        }
        for job in &discarded {
            job.discard();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        self.shared.jobs.post_n(workers.len());

        let me = thread::current().id();
        for handle in workers {
            if handle.thread().id() == me {
                continue;
            }
            if handle.join().is_err() {
                log::error!("[job] worker panicked during shutdown");
            }
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.len())
            .field("workers", &self.workers())
            .finish()
    }
}

fn worker_loop(shared: &Shared, n: usize) {
    log::trace!("[job] worker {} started", n);
    while let Some(job) = shared.wait_shift() {
        job.run();
    }
    log::trace!("[job] worker {} exiting", n);
}
