//! Cooperative cancellation for long-running engine calls.
//!
//! A [`CancelToken`] lives on the caller side; a [`CancelFlag`] is the
//! worker-side view the engine polls between units of work. The token
//! mirrors its state into whichever flag is currently attached, so a cancel
//! issued at any point - including between token creation and attach - is
//! never lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// The flag a [`crate::engine::PdfEngine`] implementation polls at safe
/// points during a long-running call.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    set: Arc<AtomicBool>,
}

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct TokenInner {
    canceled: AtomicBool,
    // Guards attach/detach against a concurrent cancel(): whichever runs
    // second sees the other's effect, so a cancel never misses the flag.
    attached: Mutex<Option<CancelFlag>>,
}

/// Caller-side cancellation token for one in-flight operation.
///
/// Cancellation is monotonic: once canceled, a token stays canceled.
/// `cancel()` is idempotent and safe to call after the operation finished.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
        let attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(flag) = attached.as_ref() {
            flag.set();
        }
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Mirror this token into `flag` while an operation is in flight. An
    /// already-set cancellation propagates immediately.
    pub fn attach(&self, flag: CancelFlag) {
        let mut attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_canceled() {
            flag.set();
        }
        *attached = Some(flag);
    }

    pub fn detach(&self) {
        let mut attached = self
            .inner
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *attached = None;
    }

    /// Attach with guaranteed detach when the guard drops, including on
    /// panic paths.
    #[must_use]
    pub fn attach_guard(&self, flag: CancelFlag) -> AttachGuard<'_> {
        self.attach(flag);
        AttachGuard { token: self }
    }
}

/// Detaches the token's mirrored flag on drop.
pub struct AttachGuard<'a> {
    token: &'a CancelToken,
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        self.token.detach();
    }
}
