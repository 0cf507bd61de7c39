//! The fixed call surface of the native PDF engine.
//!
//! The engine itself (PDFium, MuPDF, ...) lives behind [`PdfEngine`]. Nothing
//! in this crate interprets PDF semantics; every trait method is one native
//! call that the worker thread serializes. Implementations are `Send` so the
//! worker thread can own them, but they are never required to be `Sync` -
//! exactly one thread ever enters the engine.

use std::path::PathBuf;

use crate::cancel::CancelFlag;

/// Opaque handle to an open document inside the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Where the document bytes come from.
#[derive(Clone, Debug)]
pub enum DocumentSource {
    /// Read from a file on disk.
    File(PathBuf),
    /// Already-loaded bytes (e.g. downloaded or embedded).
    Memory(Vec<u8>),
}

/// Page rotation in quarter turns, as stored in the page dictionary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

/// Geometry and rotation of one page, in PDF points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageInfo {
    /// Page index (0-based). Never changes once the document is open.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub rotation: Rotation,
}

/// Parameters for rendering a page to a bitmap.
#[derive(Clone, Copy, Debug)]
pub struct RenderParams {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Background fill as 0xRRGGBB.
    pub background: u32,
}

/// Raw rendered page image.
#[derive(Clone)]
pub struct Bitmap {
    /// Raw RGB pixel data (3 bytes per pixel: R, G, B).
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels", &self.pixels.len())
            .finish()
    }
}

/// Axis-aligned rectangle in page coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectF {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// Link target type
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    Internal { page: usize },
    External { uri: String },
}

/// A clickable link area on a page.
#[derive(Clone, Debug)]
pub struct Link {
    pub rect: RectF,
    pub target: LinkTarget,
}

/// One line of extracted text with its bounding box.
#[derive(Clone, Debug)]
pub struct LineBounds {
    pub rect: RectF,
    pub text: String,
}

/// Full text of one page plus per-line geometry.
#[derive(Clone, Debug, Default)]
pub struct PageText {
    pub text: String,
    pub lines: Vec<LineBounds>,
}

/// A document outline (bookmark) entry, flattened depth-first.
#[derive(Clone, Debug)]
pub struct OutlineEntry {
    /// Display title
    pub title: String,
    /// Nesting level (0 = top level)
    pub level: usize,
    /// Navigation target, if the entry has one.
    pub target: Option<LinkTarget>,
}

/// Errors reported by the native engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("document requires a password or the supplied password is wrong")]
    BadPassword,

    #[error("document is corrupt or not a PDF")]
    Corrupt,

    #[error("page index {index} out of range (page count {count})")]
    PageOutOfRange { index: usize, count: usize },

    #[error("document handle is closed or unknown")]
    DocumentClosed,

    #[error("native call failed with code {code}: {detail}")]
    Native { code: i32, detail: String },
}

/// The serialized native call surface.
///
/// Every method runs on the worker thread, one call at a time. Long-running
/// calls ([`render_page`](PdfEngine::render_page)) poll the supplied
/// [`CancelFlag`] at safe points and bail out early when it is set; a
/// canceled render returns `Ok(None)`, not an error.
pub trait PdfEngine: Send + 'static {
    fn open_document(
        &mut self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<DocumentId, EngineError>;

    fn close_document(&mut self, doc: DocumentId) -> Result<(), EngineError>;

    fn page_count(&mut self, doc: DocumentId) -> Result<usize, EngineError>;

    /// Load one page's geometry and rotation.
    fn load_page(&mut self, doc: DocumentId, index: usize) -> Result<PageInfo, EngineError>;

    fn render_page(
        &mut self,
        doc: DocumentId,
        index: usize,
        params: &RenderParams,
        cancel: &CancelFlag,
    ) -> Result<Option<Bitmap>, EngineError>;

    fn extract_text(&mut self, doc: DocumentId, index: usize) -> Result<PageText, EngineError>;

    fn links(&mut self, doc: DocumentId, index: usize) -> Result<Vec<Link>, EngineError>;

    fn outline(&mut self, doc: DocumentId) -> Result<Vec<OutlineEntry>, EngineError>;
}
