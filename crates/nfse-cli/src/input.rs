//! Turning files on disk into XML text for the extractor.
//!
//! Bytes are decoded as strict UTF-8 first and fall back to a legacy
//! single-byte encoding (Windows-1252 by default). ZIP archives are opened and
//! every `.xml` entry becomes its own document.

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, anyhow, bail};
use encoding_rs::Encoding;
use tracing::{debug, warn};

use nfse_core::InputConfig;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Metadata entries macOS adds to archives; never invoices.
const MACOS_METADATA_DIR: &str = "__MACOSX/";

/// One decoded XML document and where it came from.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File path, or `archive.zip:entry.xml` for archive entries.
    pub name: String,
    pub text: String,
}

/// Whether `path` looks like something [`load_documents`] can read.
pub fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_str(), "xml" | "zip")
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Decode raw bytes, trying UTF-8 before `fallback_label`.
pub fn decode_bytes(bytes: &[u8], fallback_label: &str) -> anyhow::Result<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(e) => {
            let encoding = Encoding::for_label(fallback_label.as_bytes())
                .ok_or_else(|| anyhow!("Unknown fallback encoding: {}", fallback_label))?;
            debug!(
                "Not valid UTF-8 ({}), decoding as {}",
                e,
                encoding.name()
            );
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if had_errors {
                warn!("Input had bytes invalid in {} as well", encoding.name());
            }
            Ok(decoded.into_owned())
        }
    }
}

/// Read every XML document contained in `path`.
pub fn load_documents(path: &Path, config: &InputConfig) -> anyhow::Result<Vec<SourceDocument>> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }

    match extension(path).as_str() {
        "xml" => {
            let size = fs::metadata(path)?.len();
            if exceeds_limit(size, config) {
                bail!(
                    "{} is {} bytes, above the {} byte limit",
                    path.display(),
                    size,
                    config.max_file_size
                );
            }

            let bytes = fs::read(path)?;
            Ok(vec![SourceDocument {
                name: path.display().to_string(),
                text: decode_bytes(&bytes, &config.fallback_encoding)?,
            }])
        }
        "zip" if config.read_zip_archives => read_zip(path, config),
        "zip" => bail!(
            "Reading ZIP archives is disabled in the configuration ({})",
            path.display()
        ),
        other => bail!("Unsupported file format: {}", other),
    }
}

fn exceeds_limit(size: u64, config: &InputConfig) -> bool {
    config.max_file_size > 0 && size > config.max_file_size
}

fn read_zip(path: &Path, config: &InputConfig) -> anyhow::Result<Vec<SourceDocument>> {
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to open archive {}", path.display()))?;

    let mut documents = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let entry_name = entry.name().to_string();

        if entry.is_dir()
            || entry_name.starts_with(MACOS_METADATA_DIR)
            || !entry_name.to_lowercase().ends_with(".xml")
        {
            continue;
        }

        if exceeds_limit(entry.size(), config) {
            warn!(
                "Skipping {} in {}: {} bytes exceeds limit",
                entry_name,
                path.display(),
                entry.size()
            );
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        documents.push(SourceDocument {
            name: format!("{}:{}", path.display(), entry_name),
            text: decode_bytes(&bytes, &config.fallback_encoding)?,
        });
    }

    debug!("Read {} XML entries from {}", documents.len(), path.display());
    Ok(documents)
}
