//! Background-worker serialization layer for a native PDF engine.
//!
//! Native PDF engines (PDFium, MuPDF) must never be entered from two threads
//! at once. This crate funnels every engine call through one dedicated
//! worker thread: callers submit closures over an asynchronous request/reply
//! channel and block only on their own one-shot reply. The worker can be
//! suspended to pause work during bulk mutations, and the document layer
//! adds progressive page loading and cooperative render cancellation on top.
//!
//! The engine itself is a trait ([`PdfEngine`]); this crate ships no FFI
//! bindings and interprets no PDF semantics.

pub mod cancel;
pub mod config;
pub mod document;
pub mod engine;
mod envelope;
pub mod global;
pub mod handle;
pub mod scratch;
mod worker;

pub use cancel::{AttachGuard, CancelFlag, CancelToken};
pub use config::WorkerConfig;
pub use document::{Document, LoadProgress, PageSlot};
pub use engine::{
    Bitmap, DocumentId, DocumentSource, EngineError, LineBounds, Link, LinkTarget, OutlineEntry,
    PageInfo, PageText, PdfEngine, RectF, RenderParams, Rotation,
};
pub use envelope::WorkerError;
pub use handle::{SuspendedWorker, WorkerHandle};
pub use scratch::Scratch;
