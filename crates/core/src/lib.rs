//! Core pipeline: page orchestration, redaction compositing and the classification gate.

pub mod classification;
pub mod collaborators;
pub mod compositor;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod storage;
pub mod taxonomy;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use classification::{ClassificationFeedback, ClassificationResult, FeedbackSource};
pub use collaborators::{
    ArtifactLocator, ArtifactStore, ClassificationEngine, ExtractionEngine, FeedbackStore,
    PageRenderer, PdfPageSplitter, SemanticFieldMatcher, TaxonomyService,
};
pub use compositor::{
    FallbackPlacement, RedactionCompositor, RedactionRequest, RedactionResult, RendererKind,
};
pub use config::{
    load_config, save_config, GateConfig, OrchestratorConfig, PipelineConfig, RedactionConfig,
};
pub use context::{PipelineContext, PipelineContextBuilder};
pub use document::{
    ExtractedField, Field, FieldAction, Page, PageExtraction, PageReport, PageStatus,
    PipelineResult,
};
pub use error::{CoreError, Result};
pub use gate::{ClassificationGate, FeedbackDraft, GateCommand, GateEvent, GateSnapshot, GateState};
pub use orchestrator::{ignore_progress, PageOrchestrator, ProgressEvent, ProgressSink};
pub use storage::{
    FallbackArtifactStore, InMemoryArtifactStore, InMemoryFeedbackStore, LocalArtifactStore,
};
pub use taxonomy::{
    apply_semantic_matches, apply_taxonomy, FieldMatch, StaticTaxonomy, TaxonomyElement,
};
pub use workflow::{ClassificationWorkflow, ProcessingOutcome, RedactedArtifact};

pub use veil_geometry::{BoundingBox, DeviceRect, FillRegion, RawBoundingBox, Rotation, Surface};
