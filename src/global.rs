//! Optional process-wide default worker.
//!
//! Embedders that want one shared worker install it explicitly; nothing here
//! spawns implicitly. The store is type-erased because handles are generic
//! over their engine type; [`get`] recovers the handle by downcasting.

use std::any::Any;
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::handle::WorkerHandle;

static DEFAULT: LazyLock<RwLock<Option<Box<dyn Any + Send + Sync>>>> =
    LazyLock::new(|| RwLock::new(None));

/// Install `handle` as the process-wide default, replacing any previous one.
/// The replaced handle's worker stops when its last clone drops.
pub fn install<S: Send + 'static>(handle: WorkerHandle<S>) {
    let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Box::new(handle));
}

/// Fetch a clone of the default handle, if one of this engine type is
/// installed.
#[must_use]
pub fn get<S: Send + 'static>() -> Option<WorkerHandle<S>> {
    let slot = DEFAULT.read().unwrap_or_else(PoisonError::into_inner);
    slot.as_ref()
        .and_then(|boxed| boxed.downcast_ref::<WorkerHandle<S>>())
        .cloned()
}

/// Remove the default handle. Other clones keep working; the worker thread
/// stops once every clone is gone.
pub fn teardown() {
    let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
    *slot = None;
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn install_get_teardown_roundtrip() {
        teardown();
        assert!(get::<u32>().is_none());

        install(WorkerHandle::<u32>::with_defaults(|_| Ok(7)));
        let handle = get::<u32>().expect("default installed");
        let value = handle.compute((), |state, ()| *state).unwrap();
        assert_eq!(value, 7);

        teardown();
        assert!(get::<u32>().is_none());
        // The clone we took keeps working after teardown.
        assert_eq!(handle.compute((), |state, ()| *state).unwrap(), 7);
    }

    #[test]
    #[serial]
    fn get_with_wrong_engine_type_is_none() {
        teardown();
        install(WorkerHandle::<u32>::with_defaults(|_| Ok(0)));
        assert!(get::<String>().is_none());
        teardown();
    }
}
