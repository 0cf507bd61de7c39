//! Client-facing worker handle.
//!
//! A [`WorkerHandle`] hides the worker thread behind a call/response API.
//! It is cheap to clone and safe to share; many threads may submit work
//! concurrently, and each call blocks only on its own one-shot reply.
//!
//! Lifecycle policy: the worker thread spawns lazily on first use and
//! respawns after [`stop`](WorkerHandle::stop). [`dispose`](WorkerHandle::dispose)
//! is the terminal variant; afterwards every call fails with
//! [`WorkerError::Disposed`].

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use flume::Sender;
use log::{debug, error, warn};

use crate::config::WorkerConfig;
use crate::engine::EngineError;
use crate::envelope::{Envelope, Job, TaskId, WorkerError};
use crate::scratch::Scratch;
use crate::worker::worker_loop;

type Factory<S> = dyn Fn(&WorkerConfig) -> Result<S, EngineError> + Send + Sync;

enum Link<S> {
    Idle,
    Running {
        tx: Sender<Envelope<S>>,
        join: JoinHandle<()>,
    },
    Disposed,
}

struct HandleInner<S: Send + 'static> {
    factory: Box<Factory<S>>,
    config: WorkerConfig,
    link: Mutex<Link<S>>,
    next_task_id: AtomicU64,
}

pub struct WorkerHandle<S: Send + 'static> {
    inner: Arc<HandleInner<S>>,
}

impl<S: Send + 'static> Clone for WorkerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + 'static> WorkerHandle<S> {
    /// Create a handle. No thread is spawned until the first call; the
    /// factory runs on the worker thread, once per (re)spawn, with the
    /// config propagated from the creating context.
    pub fn new<F>(config: WorkerConfig, factory: F) -> Self
    where
        F: Fn(&WorkerConfig) -> Result<S, EngineError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(HandleInner {
                factory: Box::new(factory),
                config,
                link: Mutex::new(Link::Idle),
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn with_defaults<F>(factory: F) -> Self
    where
        F: Fn(&WorkerConfig) -> Result<S, EngineError> + Send + Sync + 'static,
    {
        Self::new(WorkerConfig::default(), factory)
    }

    /// Run `callback(state, message)` on the worker thread and return its
    /// result.
    ///
    /// The message is moved across the thread boundary; the callback must be
    /// self-contained (`Send + 'static`) and must not call back into this
    /// handle, since that would wait on the very thread it runs on.
    pub fn compute<M, F, R>(&self, message: M, callback: F) -> Result<R, WorkerError>
    where
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> R + Send + 'static,
        R: Send + 'static,
    {
        let tx = self.ensure_running()?;
        self.compute_on(&tx, false, message, callback)
    }

    /// Like [`compute`](Self::compute), with a [`Scratch`] arena as the first
    /// callback argument. The arena is released on the worker side when the
    /// callback returns, normally or by panic.
    pub fn compute_with_scratch<M, F, R>(&self, message: M, callback: F) -> Result<R, WorkerError>
    where
        M: Send + 'static,
        F: FnOnce(&Scratch, &mut S, M) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.compute(message, move |state, message| {
            let scratch = Scratch::new();
            callback(&scratch, state, message)
        })
    }

    /// Suspend the worker for the duration of `action`.
    ///
    /// Once this method has sent `Suspend` and received the acknowledgment,
    /// no compute task submitted through this handle starts until the
    /// matching resume. The action receives a [`SuspendedWorker`] whose
    /// compute calls bypass the gate, so work issued by the action itself
    /// still executes. Resume is sent even when the action panics. Calls
    /// nest; the deferred queue drains only when the outermost action
    /// resumes.
    pub fn suspend_during_action<F, T>(&self, action: F) -> Result<T, WorkerError>
    where
        F: FnOnce(&SuspendedWorker<'_, S>) -> T,
    {
        let tx = self.ensure_running()?;

        let (ack_tx, ack_rx) = flume::bounded(1);
        tx.send(Envelope::Suspend { ack: ack_tx })
            .map_err(|_| WorkerError::WorkerGone)?;
        ack_rx.recv().map_err(|_| WorkerError::WorkerGone)?;

        let suspended = SuspendedWorker { handle: self, tx };
        let result = catch_unwind(AssertUnwindSafe(|| action(&suspended)));

        let (ack_tx, ack_rx) = flume::bounded(1);
        if suspended
            .tx
            .send(Envelope::Resume { ack: ack_tx })
            .is_ok()
        {
            let _ = ack_rx.recv();
        } else {
            warn!("worker stopped during suspend_during_action; resume dropped");
        }

        match result {
            Ok(value) => Ok(value),
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Shut the worker thread down and wait for it to exit. In-flight work
    /// finishes first (the loop is serial); deferred and queued tasks are
    /// abandoned. The handle stays usable: the next call respawns.
    pub fn stop(&self) {
        self.shutdown(Link::Idle);
    }

    /// Terminal shutdown. Subsequent calls fail with
    /// [`WorkerError::Disposed`].
    pub fn dispose(&self) {
        self.shutdown(Link::Disposed);
    }

    /// Whether a worker thread is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            *self.lock_link(),
            Link::Running { .. }
        )
    }

    fn shutdown(&self, next: Link<S>) {
        let previous = {
            let mut link = self.lock_link();
            std::mem::replace(&mut *link, next)
        };
        if let Link::Running { tx, join } = previous {
            let _ = tx.send(Envelope::Stop);
            if join.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
    }

    fn lock_link(&self) -> std::sync::MutexGuard<'_, Link<S>> {
        self.inner
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the inbound channel, spawning the worker thread if needed. The
    /// link mutex makes concurrent first use spawn exactly one thread.
    fn ensure_running(&self) -> Result<Sender<Envelope<S>>, WorkerError> {
        let mut link = self.lock_link();
        match &*link {
            Link::Running { tx, .. } => Ok(tx.clone()),
            Link::Disposed => Err(WorkerError::Disposed),
            Link::Idle => {
                let (tx, join) = self.spawn()?;
                *link = Link::Running {
                    tx: tx.clone(),
                    join,
                };
                Ok(tx)
            }
        }
    }

    fn spawn(&self) -> Result<(Sender<Envelope<S>>, JoinHandle<()>), WorkerError> {
        let (tx, rx) = flume::unbounded();
        let (ready_tx, ready_rx) = flume::bounded(1);
        let inner = Arc::clone(&self.inner);

        debug!("spawning worker thread \"{}\"", self.inner.config.thread_name);
        let join = std::thread::Builder::new()
            .name(self.inner.config.thread_name.clone())
            .spawn(move || match (inner.factory)(&inner.config) {
                Ok(state) => {
                    let _ = ready_tx.send(Ok(()));
                    worker_loop(state, rx);
                }
                Err(e) => {
                    error!("engine startup failed: {e}");
                    let _ = ready_tx.send(Err(e));
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((tx, join)),
            Ok(Err(engine_err)) => {
                let _ = join.join();
                Err(WorkerError::Engine(engine_err))
            }
            Err(_) => {
                // Factory panicked before reporting readiness.
                let _ = join.join();
                Err(WorkerError::WorkerGone)
            }
        }
    }

    fn compute_on<M, F, R>(
        &self,
        tx: &Sender<Envelope<S>>,
        bypass_gate: bool,
        message: M,
        callback: F,
    ) -> Result<R, WorkerError>
    where
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> R + Send + 'static,
        R: Send + 'static,
    {
        let id = TaskId(self.inner.next_task_id.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = flume::bounded(1);

        let job: Job<S> = Box::new(move |state: &mut S| {
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(state, message)))
                .map_err(|payload| WorkerError::from_panic(payload.as_ref()));
            if let Err(e) = &outcome {
                error!("{id} failed: {e}");
            }
            // Exactly one reply per envelope. A closed reply channel means
            // the caller is gone; nothing to deliver.
            let _ = reply_tx.send(outcome);
        });

        tx.send(Envelope::Compute {
            id,
            job,
            bypass_gate,
        })
        .map_err(|_| WorkerError::WorkerGone)?;

        reply_rx.recv().map_err(|_| WorkerError::WorkerGone)?
    }
}

impl<S: Send + 'static> Drop for HandleInner<S> {
    fn drop(&mut self) {
        let link = std::mem::replace(
            self.link.get_mut().unwrap_or_else(PoisonError::into_inner),
            Link::Disposed,
        );
        if let Link::Running { tx, .. } = link {
            let _ = tx.send(Envelope::Stop);
        }
    }
}

/// Proxy handed to a `suspend_during_action` action. Its compute calls
/// bypass the suspend gate, so they execute even though the worker is
/// suspended for everyone else.
pub struct SuspendedWorker<'a, S: Send + 'static> {
    handle: &'a WorkerHandle<S>,
    tx: Sender<Envelope<S>>,
}

impl<S: Send + 'static> SuspendedWorker<'_, S> {
    pub fn compute<M, F, R>(&self, message: M, callback: F) -> Result<R, WorkerError>
    where
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.compute_on(&self.tx, true, message, callback)
    }

    pub fn compute_with_scratch<M, F, R>(&self, message: M, callback: F) -> Result<R, WorkerError>
    where
        M: Send + 'static,
        F: FnOnce(&Scratch, &mut S, M) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.compute(message, move |state, message| {
            let scratch = Scratch::new();
            callback(&scratch, state, message)
        })
    }
}
