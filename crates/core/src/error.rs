use thiserror::Error;
use veil_geometry::GeometryError;
use veil_pdf::PdfError;
use veil_render::RenderError;

use crate::document::PageReport;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    InvalidGeometry(#[from] GeometryError),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("page split failed: {0}")]
    PageSplitFailure(String),
    #[error("page {} extraction failed: {reason}", .ordinal + 1)]
    PageExtractionFailure { ordinal: usize, reason: String },
    #[error("no pages processed: all {total} pages failed")]
    NoPagesProcessed { total: usize, pages: Vec<PageReport> },
    #[error("classification failed: {0}")]
    ClassificationFailure(String),
    #[error(
        "stale selection: field {field_id} is on page {} of a {page_count}-page document",
        .page_ordinal + 1
    )]
    StaleSelection {
        field_id: String,
        page_ordinal: usize,
        page_count: usize,
    },
    #[error("processing failed: {0}")]
    ProcessingFailure(String),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("output verification failed: {0}")]
    VerificationFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("a correction must name the corrected document type")]
    MissingCorrection,
    #[error("invalid transition: {event} is not accepted in state {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}
