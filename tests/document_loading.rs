//! Document-layer behavior against a scripted fake engine: progressive
//! loading, cancellation, and error surfacing.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pdfium_worker::{
    Bitmap, CancelFlag, CancelToken, Document, DocumentId, DocumentSource, EngineError,
    LineBounds, Link, LinkTarget, LoadProgress, OutlineEntry, PageInfo, PageSlot, PageText,
    PdfEngine, RectF, RenderParams, Rotation, WorkerError, WorkerHandle,
};

#[derive(Default)]
struct Counters {
    closed: AtomicUsize,
    pages_loaded: AtomicUsize,
}

struct FakeEngine {
    page_total: usize,
    page_delay: Duration,
    required_password: Option<String>,
    // When set, render_page signals this channel and then holds until the
    // cancel flag trips (or a deadline passes, so a broken test fails
    // instead of hanging).
    render_started: Option<flume::Sender<()>>,
    next_doc: u64,
    open_docs: HashSet<u64>,
    counters: Arc<Counters>,
}

impl FakeEngine {
    fn check_open(&self, doc: DocumentId) -> Result<(), EngineError> {
        if self.open_docs.contains(&doc.0) {
            Ok(())
        } else {
            Err(EngineError::DocumentClosed)
        }
    }

    fn check_page(&self, doc: DocumentId, index: usize) -> Result<(), EngineError> {
        self.check_open(doc)?;
        if index < self.page_total {
            Ok(())
        } else {
            Err(EngineError::PageOutOfRange {
                index,
                count: self.page_total,
            })
        }
    }
}

impl PdfEngine for FakeEngine {
    fn open_document(
        &mut self,
        _source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<DocumentId, EngineError> {
        if let Some(required) = &self.required_password {
            if password != Some(required.as_str()) {
                return Err(EngineError::BadPassword);
            }
        }
        self.next_doc += 1;
        self.open_docs.insert(self.next_doc);
        Ok(DocumentId::new(self.next_doc))
    }

    fn close_document(&mut self, doc: DocumentId) -> Result<(), EngineError> {
        if self.open_docs.remove(&doc.0) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(EngineError::DocumentClosed)
        }
    }

    fn page_count(&mut self, doc: DocumentId) -> Result<usize, EngineError> {
        self.check_open(doc)?;
        Ok(self.page_total)
    }

    fn load_page(&mut self, doc: DocumentId, index: usize) -> Result<PageInfo, EngineError> {
        self.check_page(doc, index)?;
        if !self.page_delay.is_zero() {
            std::thread::sleep(self.page_delay);
        }
        self.counters.pages_loaded.fetch_add(1, Ordering::SeqCst);
        Ok(PageInfo {
            index,
            width: 612.0,
            height: 792.0,
            rotation: Rotation::None,
        })
    }

    fn render_page(
        &mut self,
        doc: DocumentId,
        index: usize,
        params: &RenderParams,
        cancel: &CancelFlag,
    ) -> Result<Option<Bitmap>, EngineError> {
        self.check_page(doc, index)?;
        if let Some(started) = &self.render_started {
            let _ = started.send(());
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while !cancel.is_set() && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        let mut pixels = Vec::new();
        for _row in 0..params.height {
            if cancel.is_set() {
                return Ok(None);
            }
            pixels.extend(std::iter::repeat_n(0xFFu8, params.width as usize * 3));
        }
        Ok(Some(Bitmap {
            pixels,
            width: params.width,
            height: params.height,
        }))
    }

    fn extract_text(&mut self, doc: DocumentId, index: usize) -> Result<PageText, EngineError> {
        self.check_page(doc, index)?;
        Ok(PageText {
            text: format!("page {index}"),
            lines: vec![LineBounds {
                rect: RectF {
                    x0: 0.0,
                    y0: 0.0,
                    x1: 100.0,
                    y1: 12.0,
                },
                text: format!("page {index}"),
            }],
        })
    }

    fn links(&mut self, doc: DocumentId, index: usize) -> Result<Vec<Link>, EngineError> {
        self.check_page(doc, index)?;
        Ok(vec![Link {
            rect: RectF {
                x0: 10.0,
                y0: 10.0,
                x1: 50.0,
                y1: 20.0,
            },
            target: LinkTarget::Internal { page: 0 },
        }])
    }

    fn outline(&mut self, doc: DocumentId) -> Result<Vec<OutlineEntry>, EngineError> {
        self.check_open(doc)?;
        Ok(vec![OutlineEntry {
            title: "Chapter 1".to_string(),
            level: 0,
            target: Some(LinkTarget::Internal { page: 0 }),
        }])
    }
}

struct Fixture {
    handle: WorkerHandle<FakeEngine>,
    counters: Arc<Counters>,
}

fn fixture(page_total: usize, page_delay: Duration) -> Fixture {
    fixture_with_password(page_total, page_delay, None)
}

fn fixture_with_password(
    page_total: usize,
    page_delay: Duration,
    required_password: Option<String>,
) -> Fixture {
    fixture_inner(page_total, page_delay, required_password, None)
}

fn fixture_blocking_render(page_total: usize) -> (Fixture, flume::Receiver<()>) {
    let (started_tx, started_rx) = flume::unbounded();
    let fx = fixture_inner(page_total, Duration::ZERO, None, Some(started_tx));
    (fx, started_rx)
}

fn fixture_inner(
    page_total: usize,
    page_delay: Duration,
    required_password: Option<String>,
    render_started: Option<flume::Sender<()>>,
) -> Fixture {
    let counters = Arc::new(Counters::default());
    let factory_counters = Arc::clone(&counters);
    let handle = WorkerHandle::with_defaults(move |_| {
        Ok(FakeEngine {
            page_total,
            page_delay,
            required_password: required_password.clone(),
            render_started: render_started.clone(),
            next_doc: 0,
            open_docs: HashSet::new(),
            counters: Arc::clone(&factory_counters),
        })
    });
    Fixture { handle, counters }
}

fn source() -> DocumentSource {
    DocumentSource::Memory(vec![0x25, 0x50, 0x44, 0x46])
}

#[test]
fn zero_budget_loads_one_page_per_batch() {
    let fx = fixture(5, Duration::ZERO);
    let mut doc = Document::open(fx.handle.clone(), source()).unwrap();
    assert_eq!(doc.page_count(), 5);
    assert_eq!(doc.loaded_count(), 0);

    let mut reports = Vec::new();
    doc.load_pages_progressively(Duration::ZERO, |loaded, total| {
        reports.push((loaded, total));
        LoadProgress::Continue
    })
    .unwrap();

    // A zero budget ends every batch after its first page: ceil(5/1) calls.
    assert_eq!(
        reports,
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );
    assert_eq!(doc.loaded_count(), 5);
    assert!(doc.pages().iter().all(PageSlot::is_loaded));
    assert_eq!(fx.counters.pages_loaded.load(Ordering::SeqCst), 5);

    // Fully loaded: another call is an idempotent no-op.
    doc.load_pages_progressively(Duration::ZERO, |_, _| {
        panic!("no batch should run on a fully loaded document")
    })
    .unwrap();
}

#[test]
fn timed_budget_loads_multiple_pages_per_batch() {
    let fx = fixture(6, Duration::from_millis(60));
    let mut doc = Document::open(fx.handle.clone(), source()).unwrap();

    let mut reports = Vec::new();
    doc.load_pages_progressively(Duration::from_millis(90), |loaded, total| {
        reports.push((loaded, total));
        LoadProgress::Continue
    })
    .unwrap();

    // Two 60ms pages exceed the 90ms budget: ceil(6/2) batches.
    assert_eq!(reports, vec![(2, 6), (4, 6), (6, 6)]);
}

#[test]
fn progress_stop_halts_loading_early() {
    let fx = fixture(4, Duration::ZERO);
    let mut doc = Document::open(fx.handle.clone(), source()).unwrap();

    let mut calls = 0;
    doc.load_pages_progressively(Duration::ZERO, |loaded, _| {
        calls += 1;
        assert_eq!(loaded, 1);
        LoadProgress::Stop
    })
    .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(doc.loaded_count(), 1);

    // A later call picks up from the first unloaded page.
    let mut reports = Vec::new();
    doc.load_pages_progressively(Duration::ZERO, |loaded, total| {
        reports.push((loaded, total));
        LoadProgress::Continue
    })
    .unwrap();
    assert_eq!(reports, vec![(2, 4), (3, 4), (4, 4)]);
}

#[test]
fn zero_page_document_completes_immediately() {
    let fx = fixture(0, Duration::ZERO);
    let mut doc = Document::open(fx.handle.clone(), source()).unwrap();
    assert_eq!(doc.page_count(), 0);

    doc.load_pages_progressively(Duration::from_millis(10), |_, _| {
        panic!("progress callback must not run for an empty document")
    })
    .unwrap();
}

#[test]
fn canceled_render_returns_absence_not_error() {
    let fx = fixture(1, Duration::ZERO);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();
    let params = RenderParams {
        width: 8,
        height: 8,
        background: 0xFFFFFF,
    };

    let token = CancelToken::new();
    token.cancel();
    let bitmap = doc.render_page(0, params, &token).unwrap();
    assert!(bitmap.is_none());

    // Canceling again after completion stays a no-op.
    token.cancel();

    let fresh = CancelToken::new();
    let bitmap = doc.render_page(0, params, &fresh).unwrap();
    let bitmap = bitmap.expect("uncanceled render produces a bitmap");
    assert_eq!(bitmap.width, 8);
    assert_eq!(bitmap.height, 8);
    assert_eq!(bitmap.pixels.len(), 8 * 8 * 3);
}

#[test]
fn cancel_during_render_stops_the_render_in_flight() {
    let (fx, render_started) = fixture_blocking_render(1);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();
    let token = CancelToken::new();

    // Cancel only after the engine has entered render_page, so the token
    // trips the already-attached flag rather than short-circuiting up front.
    let canceler = {
        let token = token.clone();
        std::thread::spawn(move || {
            render_started.recv().unwrap();
            token.cancel();
        })
    };

    let params = RenderParams {
        width: 8,
        height: 8,
        background: 0xFFFFFF,
    };
    let bitmap = doc.render_page(0, params, &token).unwrap();
    assert!(bitmap.is_none());
    canceler.join().unwrap();
    assert!(token.is_canceled());
}

#[test]
fn debug_output_elides_the_handle() {
    let fx = fixture(3, Duration::ZERO);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();
    let rendered = format!("{doc:?}");
    assert!(rendered.contains("page_count: 3"));
    assert!(rendered.contains("loaded_count: 0"));
    assert!(!rendered.contains("handle"));
}

#[test]
fn wrong_password_surfaces_engine_error() {
    let fx = fixture_with_password(3, Duration::ZERO, Some("secret".to_string()));

    let err = Document::open(fx.handle.clone(), source()).unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Engine(EngineError::BadPassword)
    ));

    let doc = Document::open_with_password(fx.handle.clone(), source(), Some("secret".into()))
        .unwrap();
    assert_eq!(doc.page_count(), 3);
}

#[test]
fn page_out_of_range_is_reported() {
    let fx = fixture(2, Duration::ZERO);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();
    let err = doc.extract_text(9).unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Engine(EngineError::PageOutOfRange { index: 9, count: 2 })
    ));
}

#[test]
fn text_links_and_outline_round_through_the_worker() {
    let fx = fixture(2, Duration::ZERO);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();

    let text = doc.extract_text(1).unwrap();
    assert_eq!(text.text, "page 1");
    assert_eq!(text.lines.len(), 1);

    let links = doc.links(0).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target, LinkTarget::Internal { page: 0 });

    let outline = doc.outline().unwrap();
    assert_eq!(outline.len(), 1);
    assert_eq!(outline[0].title, "Chapter 1");
    assert_eq!(outline[0].level, 0);
}

#[test]
fn drop_closes_the_native_document() {
    let fx = fixture(1, Duration::ZERO);
    {
        let _doc = Document::open(fx.handle.clone(), source()).unwrap();
        assert_eq!(fx.counters.closed.load(Ordering::SeqCst), 0);
    }
    assert_eq!(fx.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn explicit_close_happens_once() {
    let fx = fixture(1, Duration::ZERO);
    let doc = Document::open(fx.handle.clone(), source()).unwrap();
    doc.close().unwrap();
    assert_eq!(fx.counters.closed.load(Ordering::SeqCst), 1);
}
