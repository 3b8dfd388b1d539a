//! Document model abstraction
//!
//! The patch engine never touches a file format directly. It talks to a
//! [`DocumentProvider`] that opens documents exposing per-page line
//! extraction and a few drawing primitives.
//!
//! ```text
//!   DocumentProvider ──open──▶ DocumentModel ──page(i)──▶ PageSurface
//!                                   │                        │
//!                                 save                extract_lines
//!                                                     fill_rect / draw_line
//!                                                     insert_text / measure_text
//! ```
//!
//! Two providers ship with the crate: [`PdfProvider`] for real PDF files and
//! [`MemoryProvider`], which records drawing calls.

mod error;
mod memory;
mod pdf;
mod traits;
mod types;

pub use error::{DocumentError, DocumentResult};
pub use memory::{DrawOp, MemoryDocument, MemoryPage, MemoryProvider};
pub use pdf::{PdfDocument, PdfProvider};
pub use traits::{DocumentModel, DocumentProvider, PageSurface};
pub use types::{Point, RawColor, RawLine, RawSpan, Rect, Rgb, StandardFont, StyleFlags};

#[cfg(test)]
pub(crate) use pdf::tests::sample_pdf;
