//! Core library for NFS-e (Brazilian service invoice) extraction.
//!
//! This crate provides:
//! - Dialect detection between the GISS/ABRASF municipal layout and the
//!   unified national layout
//! - Priority-ordered field resolution tolerant of namespace drift
//! - Locale-aware number parsing and text sanitizing
//! - A uniform [`InvoiceRecord`] regardless of source dialect
//!
//! Input is already-decoded XML text; byte decoding and archive handling are
//! left to callers.

pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod xml;

pub use error::{NfseError, Result};
pub use extract::{
    DialectRules, ExtractionResult, NfseExtractor, detect_dialect, extract_invoices,
};
pub use models::config::{ExtractionConfig, IdStrategy, InputConfig, NfseConfig};
pub use models::invoice::{Dialect, InvoiceRecord, RecordTotals};
pub use normalize::{normalize_number, sanitize_text};
