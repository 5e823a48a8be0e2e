//! Error types for the nfse-core library.

use thiserror::Error;

/// Main error type for the nfse library.
///
/// Missing fields and unrecognized dialects are never errors: they resolve to
/// defaults or to an empty record list. Only a document that cannot be parsed
/// at all fails the whole call.
#[derive(Error, Debug)]
pub enum NfseError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Raw bytes could not be turned into text.
    #[error("decode error: {0}")]
    Decode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for the nfse library.
pub type Result<T> = std::result::Result<T, NfseError>;
