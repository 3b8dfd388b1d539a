//! Palimpsest Server Library
//!
//! Retypes text in existing PDFs by painting over the original run and
//! drawing the replacement on top, and keeps uploaded files alive only for
//! as long as a client is working with them.
//!
//! # Modules
//!
//! - `document`: Document model traits plus the lopdf and in-memory providers
//! - `patch`: Span extraction and the patch engine (fonts, geometry, colors)
//! - `session`: Expiring file sessions and the background reaper
//! - `storage`: Flat key/file storage backends
//! - `ocr`: Optional text layer for scanned uploads
//! - `routes`: HTTP surface

pub mod config;
pub mod document;
pub mod error;
pub mod ocr;
pub mod patch;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
