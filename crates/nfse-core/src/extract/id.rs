//! Record id assignment.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::config::IdStrategy;
use crate::models::invoice::InvoiceRecord;

const RANDOM_SUFFIX_LEN: usize = 5;
const HASH_SUFFIX_LEN: usize = 10;

/// Hands out record ids for one extraction call.
///
/// Source ids are kept as they are. Synthesized ids never repeat within the
/// same generator.
#[derive(Debug)]
pub struct IdGenerator {
    strategy: IdStrategy,
    issued: HashSet<String>,
}

impl IdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            issued: HashSet::new(),
        }
    }

    /// Id for the record at `ordinal`, preferring the node's own `source_id`.
    pub fn assign(&mut self, source_id: Option<&str>, record: &InvoiceRecord, ordinal: usize) -> String {
        if let Some(id) = source_id.map(str::trim).filter(|id| !id.is_empty()) {
            self.issued.insert(id.to_string());
            return id.to_string();
        }

        let mut attempt = 0u32;
        loop {
            let candidate = format!("inv-{}-{}", record.numero, self.suffix(record, ordinal, attempt));
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
            attempt += 1;
        }
    }

    fn suffix(&self, record: &InvoiceRecord, ordinal: usize, attempt: u32) -> String {
        match self.strategy {
            IdStrategy::Random => {
                let mut suffix = Uuid::new_v4().simple().to_string();
                suffix.truncate(RANDOM_SUFFIX_LEN);
                suffix
            }
            IdStrategy::Deterministic => {
                let mut hasher = Sha256::new();
                hasher.update(record.numero.as_bytes());
                hasher.update(b"|");
                hasher.update(record.prestador_cnpj.as_bytes());
                hasher.update(b"|");
                hasher.update(ordinal.to_le_bytes());
                hasher.update(attempt.to_le_bytes());
                let mut suffix = hex::encode(hasher.finalize());
                suffix.truncate(HASH_SUFFIX_LEN);
                suffix
            }
        }
    }
}
