//! Messages exchanged between worker handles and the worker loop.

use crate::engine::EngineError;

/// Unique identifier for compute tasks, used in logs and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task #{}", self.0)
    }
}

/// A type-erased compute job. The closure executes the caller's callback and
/// sends exactly one reply into the caller's one-shot channel, even when the
/// callback panics.
pub(crate) type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// One message on the worker's inbound channel.
///
/// Control messages (`Suspend`/`Resume`/`Stop`) are never deferred by the
/// suspend gate; compute jobs are, unless they carry `bypass_gate` (jobs
/// issued from inside a `suspend_during_action` action).
pub(crate) enum Envelope<S> {
    Compute {
        id: TaskId,
        job: Job<S>,
        bypass_gate: bool,
    },

    /// Raise the suspend level by one, then acknowledge.
    Suspend { ack: flume::Sender<()> },

    /// Lower the suspend level by one; at zero, drain deferred jobs in
    /// arrival order, then acknowledge.
    Resume { ack: flume::Sender<()> },

    /// Hard shutdown. Deferred jobs are dropped; their reply channels close,
    /// so waiting callers observe [`WorkerError::WorkerGone`] rather than a
    /// hang.
    Stop,
}

/// Errors delivered to a caller awaiting a worker reply.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("PDF engine: {0}")]
    Engine(#[from] EngineError),

    #[error("worker task panicked: {detail}")]
    TaskPanicked { detail: String },

    #[error("worker handle is disposed")]
    Disposed,

    #[error("worker stopped before the task completed")]
    WorkerGone,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl WorkerError {
    /// Extract a printable detail from a panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::TaskPanicked { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_str_is_preserved() {
        let err = WorkerError::from_panic(&"boom");
        assert_eq!(err.to_string(), "worker task panicked: boom");
    }

    #[test]
    fn panic_payload_string_is_preserved() {
        let err = WorkerError::from_panic(&String::from("kaput"));
        assert_eq!(err.to_string(), "worker task panicked: kaput");
    }

    #[test]
    fn engine_error_converts() {
        let err: WorkerError = EngineError::Corrupt.into();
        assert!(matches!(err, WorkerError::Engine(EngineError::Corrupt)));
    }
}
