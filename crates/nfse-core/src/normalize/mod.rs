//! Field-level normalizers applied to every value pulled out of a document.

pub mod number;
pub mod text;

pub use number::{normalize_number, parse_iss_withholding};
pub use text::sanitize_text;
