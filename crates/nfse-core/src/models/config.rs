//! Configuration structures for extraction and input handling.

use serde::{Deserialize, Serialize};

use crate::error::{NfseError, Result};

/// Main configuration for the nfse pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfseConfig {
    /// Invoice extraction configuration.
    pub extraction: ExtractionConfig,

    /// Input decoding configuration (used by callers of the core).
    pub input: InputConfig,
}

/// How ids are synthesized for invoice nodes without an `Id` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Number plus a random suffix; differs between runs.
    #[default]
    Random,
    /// Number plus a hash of number, provider and position; reproducible.
    Deterministic,
}

/// Invoice extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Id synthesis strategy.
    pub id_strategy: IdStrategy,

    /// Strip diacritics and decoding debris from text fields.
    pub sanitize_text: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::Random,
            sanitize_text: true,
        }
    }
}

/// Input handling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Encoding label tried when the bytes are not valid UTF-8.
    pub fallback_encoding: String,

    /// Read `.xml` entries from `.zip` archives.
    pub read_zip_archives: bool,

    /// Skip files (and archive entries) larger than this many bytes (0 = unlimited).
    pub max_file_size: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            fallback_encoding: "windows-1252".to_string(),
            read_zip_archives: true,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

impl NfseConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| NfseError::Config(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| NfseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
