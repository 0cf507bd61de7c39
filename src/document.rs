//! Typed document operations on top of the worker.
//!
//! A [`Document`] routes every native call through its [`WorkerHandle`] and
//! tracks which pages have real geometry. Pages start as placeholders and
//! are filled in by [`load_pages_progressively`](Document::load_pages_progressively),
//! which bounds the native work done per batch so callers can interleave
//! other requests between batches.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::cancel::{CancelFlag, CancelToken};
use crate::engine::{
    Bitmap, DocumentId, DocumentSource, EngineError, Link, OutlineEntry, PageInfo, PageText,
    PdfEngine, RenderParams,
};
use crate::envelope::WorkerError;
use crate::handle::WorkerHandle;

/// One entry in the page list. The list length and page indices are fixed at
/// open time; slots only ever transition placeholder -> loaded.
#[derive(Clone, Copy, Debug)]
pub enum PageSlot {
    /// Geometry not yet loaded.
    Pending,
    Loaded(PageInfo),
}

impl PageSlot {
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, PageSlot::Loaded(_))
    }

    #[must_use]
    pub const fn info(&self) -> Option<&PageInfo> {
        match self {
            PageSlot::Loaded(info) => Some(info),
            PageSlot::Pending => None,
        }
    }
}

/// Progress callback verdict for progressive loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadProgress {
    Continue,
    Stop,
}

pub struct Document<S: PdfEngine> {
    handle: WorkerHandle<S>,
    id: DocumentId,
    pages: Vec<PageSlot>,
    closed: bool,
}

impl<S: PdfEngine> Document<S> {
    /// Open a document through the worker and size the page list. Page
    /// geometry is not loaded yet; see
    /// [`load_pages_progressively`](Self::load_pages_progressively).
    pub fn open(handle: WorkerHandle<S>, source: DocumentSource) -> Result<Self, WorkerError> {
        Self::open_with_password(handle, source, None)
    }

    pub fn open_with_password(
        handle: WorkerHandle<S>,
        source: DocumentSource,
        password: Option<String>,
    ) -> Result<Self, WorkerError> {
        let (id, page_count) = handle
            .compute((source, password), |engine, (source, password)| {
                let id = engine.open_document(&source, password.as_deref())?;
                match engine.page_count(id) {
                    Ok(count) => Ok((id, count)),
                    Err(e) => {
                        let _ = engine.close_document(id);
                        Err(e)
                    }
                }
            })?
            .map_err(WorkerError::Engine)?;

        debug!("opened document {id:?} with {page_count} page(s)");
        Ok(Self {
            handle,
            id,
            pages: vec![PageSlot::Pending; page_count],
            closed: false,
        })
    }

    #[must_use]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn pages(&self) -> &[PageSlot] {
        &self.pages
    }

    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_loaded()).count()
    }

    /// Load page geometry in time-boxed batches.
    ///
    /// Each batch is one worker call that loads pages forward from the first
    /// unloaded index until either all pages are loaded or `batch_budget` is
    /// exceeded; the budget is checked between pages, and every batch loads
    /// at least one page so the loop always makes progress. After each
    /// batch, `on_progress(loaded, total)` runs on the caller's thread;
    /// returning [`LoadProgress::Stop`] ends the loop without scheduling
    /// another batch. Already-loaded documents return immediately.
    pub fn load_pages_progressively<F>(
        &mut self,
        batch_budget: Duration,
        mut on_progress: F,
    ) -> Result<(), WorkerError>
    where
        F: FnMut(usize, usize) -> LoadProgress,
    {
        loop {
            let Some(start) = self.pages.iter().position(|p| !p.is_loaded()) else {
                return Ok(());
            };

            let batch = self
                .handle
                .compute(
                    (self.id, start, batch_budget),
                    |engine: &mut S, (id, start, budget)| {
                        let total = engine.page_count(id)?;
                        let started = Instant::now();
                        let mut loaded = Vec::new();
                        for index in start..total {
                            loaded.push(engine.load_page(id, index)?);
                            if started.elapsed() >= budget {
                                break;
                            }
                        }
                        Ok::<_, EngineError>(loaded)
                    },
                )?
                .map_err(WorkerError::Engine)?;

            for info in batch {
                debug_assert!(info.index < self.pages.len());
                if let Some(slot) = self.pages.get_mut(info.index) {
                    *slot = PageSlot::Loaded(info);
                }
            }

            if on_progress(self.loaded_count(), self.pages.len()) == LoadProgress::Stop {
                debug!("progressive load stopped by caller at {}", self.loaded_count());
                return Ok(());
            }
        }
    }

    /// Render one page. Returns `Ok(None)` when the token was canceled
    /// before or during the render; cancellation is not an error.
    pub fn render_page(
        &self,
        index: usize,
        params: RenderParams,
        token: &CancelToken,
    ) -> Result<Option<Bitmap>, WorkerError> {
        let flag = CancelFlag::new();
        let _attached = token.attach_guard(flag.clone());
        self.engine_call((self.id, index, params, flag), |engine, (id, index, params, flag)| {
            engine.render_page(id, index, &params, &flag)
        })
    }

    pub fn extract_text(&self, index: usize) -> Result<PageText, WorkerError> {
        self.engine_call((self.id, index), |engine, (id, index)| {
            engine.extract_text(id, index)
        })
    }

    pub fn links(&self, index: usize) -> Result<Vec<Link>, WorkerError> {
        self.engine_call((self.id, index), |engine, (id, index)| {
            engine.links(id, index)
        })
    }

    pub fn outline(&self) -> Result<Vec<OutlineEntry>, WorkerError> {
        self.engine_call(self.id, |engine, id| engine.outline(id))
    }

    /// Close the native document. Consumes the handle; drop does the same
    /// best-effort.
    pub fn close(mut self) -> Result<(), WorkerError> {
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<(), WorkerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.engine_call(self.id, |engine, id| engine.close_document(id))
    }

    fn engine_call<M, T, F>(&self, message: M, callback: F) -> Result<T, WorkerError>
    where
        M: Send + 'static,
        T: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<T, EngineError> + Send + 'static,
    {
        self.handle
            .compute(message, callback)?
            .map_err(WorkerError::Engine)
    }
}

impl<S: PdfEngine> std::fmt::Debug for Document<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("page_count", &self.pages.len())
            .field("loaded_count", &self.loaded_count())
            .finish_non_exhaustive()
    }
}

impl<S: PdfEngine> Drop for Document<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!("failed to close document {:?}: {e}", self.id);
        }
    }
}
