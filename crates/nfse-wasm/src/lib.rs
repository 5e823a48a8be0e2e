//! WASM bindings for NFS-e XML extraction.
//!
//! This crate provides WebAssembly bindings for use in browsers and Node.js.
//! Decoding uploaded files to text happens on the JS side (`TextDecoder`).
//! Amounts cross into JS as numbers; use the CLI or core JSON when exact
//! decimal strings matter.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use wasm_bindgen::prelude::*;

use nfse_core::extract::{Field, FieldKind};
use nfse_core::{IdStrategy, InvoiceRecord, NfseExtractor, RecordTotals};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Plain JS objects, not `Map`s.
fn to_js(value: &Value) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_err)
}

/// Replace the decimal string at `key` with a JSON number.
fn amount_to_number(object: &mut Map<String, Value>, key: &str) {
    let number = match object.get(key) {
        Some(Value::String(text)) => text.parse::<f64>().ok().and_then(Number::from_f64),
        _ => None,
    };
    if let Some(number) = number {
        object.insert(key.to_string(), Value::Number(number));
    }
}

fn record_json(record: &InvoiceRecord) -> Result<Value, JsValue> {
    let mut json = serde_json::to_value(record).map_err(js_err)?;
    if let Some(object) = json.as_object_mut() {
        for field in Field::ALL.iter().filter(|f| f.kind() == FieldKind::Amount) {
            amount_to_number(object, field.name());
        }
    }
    Ok(json)
}

fn records_json(records: &[InvoiceRecord]) -> Result<Value, JsValue> {
    records
        .iter()
        .map(record_json)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn totals_json(totals: &RecordTotals) -> Result<Value, JsValue> {
    let mut json = serde_json::to_value(totals).map_err(js_err)?;
    if let Some(object) = json.as_object_mut() {
        let keys: Vec<String> = object
            .iter()
            .filter(|(_, v)| v.is_string())
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            amount_to_number(object, &key);
        }
    }
    Ok(json)
}

/// Extract all invoices from NFS-e XML text.
///
/// Returns an array of records with camelCase keys. Amounts are numbers.
#[wasm_bindgen]
pub fn extract_invoices(xml: &str) -> Result<JsValue, JsValue> {
    let records = nfse_core::extract_invoices(xml).map_err(js_err)?;
    to_js(&records_json(&records)?)
}

/// Same as [`extract_invoices`], serialized to a JSON string.
#[wasm_bindgen]
pub fn extract_invoices_json(xml: &str) -> Result<String, JsValue> {
    let records = nfse_core::extract_invoices(xml).map_err(js_err)?;
    serde_json::to_string(&records_json(&records)?).map_err(js_err)
}

/// Parse a Brazilian or plain formatted number (e.g., "1.234,56").
#[wasm_bindgen]
pub fn normalize_number(raw: &str) -> f64 {
    nfse_core::normalize_number(raw).to_f64().unwrap_or(0.0)
}

/// Strip diacritics and decoding debris from text.
#[wasm_bindgen]
pub fn sanitize_text(raw: &str) -> String {
    nfse_core::sanitize_text(raw)
}

/// Name of the layout the document uses ("GISS/ABRASF" or "NFS-e Nacional").
#[wasm_bindgen]
pub fn detect_dialect(xml: &str) -> Result<String, JsValue> {
    let doc = roxmltree::Document::parse(xml).map_err(js_err)?;
    Ok(nfse_core::detect_dialect(&doc).display().to_string())
}

/// Invoice extractor class for browser use.
#[wasm_bindgen(js_name = NfseExtractor)]
pub struct NfseExtractorJs {
    extractor: NfseExtractor,
}

#[wasm_bindgen(js_class = NfseExtractor)]
impl NfseExtractorJs {
    /// Create a new extractor with default settings.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            extractor: NfseExtractor::new(),
        }
    }

    /// Synthesize reproducible ids instead of random ones.
    #[wasm_bindgen]
    pub fn set_deterministic_ids(&mut self, deterministic: bool) {
        let strategy = if deterministic {
            IdStrategy::Deterministic
        } else {
            IdStrategy::Random
        };
        self.extractor = self.extractor.clone().with_id_strategy(strategy);
    }

    /// Toggle diacritic stripping on text fields.
    #[wasm_bindgen]
    pub fn set_sanitize_text(&mut self, sanitize: bool) {
        self.extractor = self.extractor.clone().with_text_sanitizing(sanitize);
    }

    /// Extract invoices from XML text.
    #[wasm_bindgen]
    pub fn extract(&self, xml: &str) -> Result<JsValue, JsValue> {
        let records = self.extractor.extract(xml).map_err(js_err)?;
        to_js(&records_json(&records)?)
    }

    /// Extract invoices along with dialect, warnings and column totals.
    #[wasm_bindgen]
    pub fn extract_with_metadata(&self, xml: &str) -> Result<JsValue, JsValue> {
        let result = self.extractor.parse(xml).map_err(js_err)?;

        let output = serde_json::json!({
            "records": records_json(&result.records)?,
            "dialect": result.dialect.display(),
            "totals": totals_json(&RecordTotals::from_records(&result.records))?,
            "warnings": result.warnings,
            "processingTimeMs": result.processing_time_ms,
        });

        to_js(&output)
    }
}

impl Default for NfseExtractorJs {
    fn default() -> Self {
        Self::new()
    }
}

/// Display helpers for Brazilian documents and amounts.
#[wasm_bindgen]
pub struct NfseUtils;

#[wasm_bindgen]
impl NfseUtils {
    /// Format a CNPJ (14 digits) as `XX.XXX.XXX/XXXX-XX` or a CPF (11 digits)
    /// as `XXX.XXX.XXX-XX`. Anything else is returned unchanged.
    #[wasm_bindgen]
    pub fn format_document(document: &str) -> String {
        let digits: String = document.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.len() {
            14 => format!(
                "{}.{}.{}/{}-{}",
                &digits[0..2],
                &digits[2..5],
                &digits[5..8],
                &digits[8..12],
                &digits[12..14]
            ),
            11 => format!(
                "{}.{}.{}-{}",
                &digits[0..3],
                &digits[3..6],
                &digits[6..9],
                &digits[9..11]
            ),
            _ => document.to_string(),
        }
    }

    /// Format an amount as Brazilian currency text (e.g., "1.234,56").
    #[wasm_bindgen]
    pub fn format_amount(amount: f64) -> String {
        let formatted = format!("{:.2}", amount.abs());
        let (integer, fraction) = formatted.split_once('.').unwrap_or((&formatted, "00"));

        let mut grouped = String::new();
        for (i, c) in integer.chars().enumerate() {
            if i > 0 && (integer.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }

        let sign = if amount < 0.0 { "-" } else { "" };
        format!("{}{},{}", sign, grouped, fraction)
    }
}
