//! Text patch engine
//!
//! Extracts editable spans from a document and applies client edits by
//! painting over the old text and drawing the new text in the closest
//! standard font.
//!
//! ```text
//!   DocumentModel ──SpanExtractor──▶ [PageSpans] ──client──▶ ChangeSet
//!                                                               │
//!   DocumentModel ◀──────────────── PatchApplier ◀──────────────┘
//!                      FontResolver · GeometryEngine · ColorClassifier · LinkDetector
//! ```

mod applier;
mod color;
mod font;
mod geometry;
mod link;
mod model;

pub use applier::{
    AppliedChange, PatchApplier, PatchError, PatchFailure, PatchReport, PatchWarning, WarningKind,
    UNDERLINE_OFFSET, UNDERLINE_WIDTH,
};
pub use color::{ColorClassifier, NON_DEFAULT_EPSILON};
pub use font::{FontResolver, StandardFontResolver};
pub use geometry::{CoverGeometry, GeometryEngine, GeometryTuning, Measure, Placement, WidthSource};
pub use link::{LinkDetector, LinkKind};
pub use model::{Change, ChangeSet, PageSpans, Span, SpanExtractor};
