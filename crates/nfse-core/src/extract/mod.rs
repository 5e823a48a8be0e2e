//! Dialect detection and invoice extraction.

pub mod abrasf;
pub mod fields;
mod id;
pub mod national;

use std::time::Instant;

use roxmltree::{Document, Node};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::config::{ExtractionConfig, IdStrategy};
use crate::models::invoice::{Dialect, InvoiceRecord};
use crate::xml::{contains_namespaced, find_all, find_element};

pub use abrasf::AbrasfRules;
pub use fields::{Candidate, Field, FieldKind, FieldRule, RawFields};
pub use id::IdGenerator;
pub use national::{NATIONAL_NAMESPACE, NationalRules};

/// Tag vocabulary and derivation rules of one dialect.
pub trait DialectRules {
    /// Dialect these rules read.
    fn dialect(&self) -> Dialect;

    /// Local name of the invoice element.
    fn invoice_tag(&self) -> &'static str;

    /// Resolve the raw text of every field found below `invoice`.
    fn read_fields(&self, invoice: Node<'_, '_>) -> RawFields;

    /// Net value for records whose source omits it, or `None` when the
    /// arithmetic leaves the decimal range.
    fn derive_net_value(&self, record: &InvoiceRecord) -> Option<Decimal>;
}

/// Pick the dialect of a whole document.
///
/// The national marker wins wherever it appears, even next to ABRASF tags;
/// everything else is read as ABRASF.
pub fn detect_dialect(doc: &Document<'_>) -> Dialect {
    let root = doc.root();
    if contains_namespaced(root, NATIONAL_NAMESPACE, national::INVOICE_TAG)
        || find_element(root, national::INVOICE_TAG).is_some()
    {
        Dialect::National
    } else {
        Dialect::Abrasf
    }
}

fn rules_for(dialect: Dialect) -> &'static dyn DialectRules {
    match dialect {
        Dialect::Abrasf => &AbrasfRules,
        Dialect::National => &NationalRules,
    }
}

/// Result of extracting one document.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// One record per invoice node, in document order.
    pub records: Vec<InvoiceRecord>,
    /// Dialect the document was read with.
    pub dialect: Dialect,
    /// Extraction warnings.
    pub warnings: Vec<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Extracts [`InvoiceRecord`]s from NFS-e XML text.
///
/// Holds no state between calls, so one extractor can serve many threads.
#[derive(Debug, Clone)]
pub struct NfseExtractor {
    id_strategy: IdStrategy,
    sanitize_text: bool,
}

impl NfseExtractor {
    /// Create a new extractor with default settings.
    pub fn new() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }

    /// Create an extractor from configuration.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            id_strategy: config.id_strategy,
            sanitize_text: config.sanitize_text,
        }
    }

    /// Set the id synthesis strategy.
    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Enable or disable text sanitizing.
    pub fn with_text_sanitizing(mut self, sanitize: bool) -> Self {
        self.sanitize_text = sanitize;
        self
    }

    /// Extract every invoice from `xml`.
    ///
    /// Fails only when `xml` is not well-formed; a document without invoices
    /// yields an empty list.
    pub fn extract(&self, xml: &str) -> Result<Vec<InvoiceRecord>> {
        Ok(self.parse(xml)?.records)
    }

    /// Extract every invoice from `xml`, with dialect, warnings and timing.
    pub fn parse(&self, xml: &str) -> Result<ExtractionResult> {
        let start = Instant::now();
        let doc = Document::parse(xml)?;
        let mut result = self.extract_document(&doc);
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Extract from an already parsed document.
    pub fn extract_document(&self, doc: &Document<'_>) -> ExtractionResult {
        let dialect = detect_dialect(doc);
        let rules = rules_for(dialect);
        let nodes = find_all(doc.root(), rules.invoice_tag());
        debug!(
            "Detected {} document with {} invoice node(s)",
            dialect.display(),
            nodes.len()
        );

        let mut warnings = Vec::new();
        if nodes.is_empty() {
            warn!("No <{}> element found, nothing to extract", rules.invoice_tag());
            warnings.push(format!("no {} invoice found", dialect.display()));
        }

        let mut ids = IdGenerator::new(self.id_strategy);
        let mut records = Vec::with_capacity(nodes.len());

        for (ordinal, node) in nodes.into_iter().enumerate() {
            let raw = rules.read_fields(node);
            let mut record = InvoiceRecord::default();
            for (field, value) in raw.iter() {
                field.apply(&mut record, value, self.sanitize_text);
            }

            for note in raw.notes() {
                warnings.push(format!("invoice {}: {}", record.numero, note));
            }

            if record.valor_liquido_nfse.is_zero() {
                match rules.derive_net_value(&record) {
                    Some(net) => {
                        record.valor_liquido_nfse = net;
                        if !net.is_zero() {
                            warnings.push(format!(
                                "invoice {}: net value derived as {}",
                                record.numero, net
                            ));
                        }
                    }
                    None => {
                        record.valor_liquido_nfse = record.valor_servicos;
                        warnings.push(format!(
                            "invoice {}: net value out of range, using gross value",
                            record.numero
                        ));
                    }
                }
            }

            record.id = ids.assign(node.attribute("Id"), &record, ordinal);
            debug!(
                "Extracted invoice {} ({} of {} fields found)",
                record.numero,
                raw.len(),
                Field::COUNT
            );
            records.push(record);
        }

        info!("Extracted {} {} invoice(s)", records.len(), dialect.display());

        ExtractionResult {
            records,
            dialect,
            warnings,
            processing_time_ms: 0,
        }
    }
}

impl Default for NfseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract with default settings.
pub fn extract_invoices(xml: &str) -> Result<Vec<InvoiceRecord>> {
    NfseExtractor::new().extract(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NfseError;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn dialect_of(xml: &str) -> Dialect {
        detect_dialect(&Document::parse(xml).unwrap())
    }

    #[test]
    fn test_detects_national_by_namespace() {
        let xml = r#"<NFSe xmlns="http://www.sped.fazenda.gov.br/nfse"><infNFSe/></NFSe>"#;
        assert_eq!(dialect_of(xml), Dialect::National);
    }

    #[test]
    fn test_detects_national_without_namespace() {
        assert_eq!(dialect_of("<NFSe><infNFSe/></NFSe>"), Dialect::National);
        assert_eq!(dialect_of(r#"<p:infNFSe xmlns:p="urn:other"/>"#), Dialect::National);
    }

    #[test]
    fn test_national_marker_wins_over_abrasf_tags() {
        let xml = r#"<Lote>
            <CompNfse><Nfse><InfNfse><Numero>1</Numero></InfNfse></Nfse></CompNfse>
            <NFSe><infNFSe><nNFSe>2</nNFSe></infNFSe></NFSe>
        </Lote>"#;
        assert_eq!(dialect_of(xml), Dialect::National);

        let records = extract_invoices(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].numero, "2");
    }

    #[test]
    fn test_defaults_to_abrasf() {
        assert_eq!(dialect_of("<CompNfse><Nfse><InfNfse/></Nfse></CompNfse>"), Dialect::Abrasf);
        assert_eq!(dialect_of("<anything/>"), Dialect::Abrasf);
    }

    #[test]
    fn test_minimal_abrasf_document() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <Numero>123</Numero>
            <Servico><Valores><ValorServicos>100,00</ValorServicos></Valores></Servico>
        </InfNfse></Nfse></CompNfse>"#;

        let records = extract_invoices(xml).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.numero, "123");
        assert_eq!(record.valor_servicos, dec("100.0"));
        assert_eq!(record.iss_retido, 2);
        assert_eq!(record.valor_liquido_nfse, dec("100.0"));
        assert_eq!(record.valor_iss, Decimal::ZERO);
        assert_eq!(record.discriminacao, "");
    }

    #[test]
    fn test_nested_values_win_over_top_level() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <ValoresNfse><ValorServicos>999,00</ValorServicos></ValoresNfse>
            <DeclaracaoPrestacaoServico><InfDeclaracaoPrestacaoServico>
                <Servico><Valores><ValorServicos>500,00</ValorServicos></Valores></Servico>
            </InfDeclaracaoPrestacaoServico></DeclaracaoPrestacaoServico>
        </InfNfse></Nfse></CompNfse>"#;

        let records = extract_invoices(xml).unwrap();
        assert_eq!(records[0].valor_servicos, dec("500"));
    }

    #[test]
    fn test_net_value_derived_from_iss() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <Numero>1</Numero>
            <ValoresNfse><ValorIss>50.00</ValorIss></ValoresNfse>
            <Servico><Valores><ValorServicos>1000.00</ValorServicos></Valores></Servico>
        </InfNfse></Nfse></CompNfse>"#;

        let result = NfseExtractor::new().parse(xml).unwrap();
        assert_eq!(result.records[0].valor_liquido_nfse, dec("950"));
        assert_eq!(result.warnings, vec!["invoice 1: net value derived as 950.00".to_string()]);
    }

    #[test]
    fn test_net_value_out_of_range_keeps_gross() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <Numero>5</Numero>
            <ValoresNfse><ValorIss>79228162514264337593543950335</ValorIss></ValoresNfse>
            <Servico><Valores><ValorServicos>-79228162514264337593543950335</ValorServicos></Valores></Servico>
        </InfNfse></Nfse></CompNfse>"#;

        let result = NfseExtractor::new().parse(xml).unwrap();
        let record = &result.records[0];
        assert_eq!(record.valor_servicos, -Decimal::MAX);
        assert_eq!(record.valor_liquido_nfse, -Decimal::MAX);
        assert_eq!(
            result.warnings,
            vec!["invoice 5: net value out of range, using gross value".to_string()]
        );
    }

    #[test]
    fn test_capped_tax_total_reported_as_warning() {
        let xml = r#"<NFSe><infNFSe><nNFSe>9</nNFSe><DPS><infDPS><valores>
            <vServPrest><vServ>10.00</vServ></vServPrest>
            <trib><totTrib><vTotTrib>
              <vTotTribFed>79228162514264337593543950335</vTotTribFed>
              <vTotTribEst>79228162514264337593543950335</vTotTribEst>
            </vTotTrib></totTrib></trib>
        </valores></infDPS></DPS></infNFSe></NFSe>"#;

        let result = NfseExtractor::new().parse(xml).unwrap();
        assert_eq!(result.records[0].val_tot_tributos, Decimal::MAX);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("invoice 9: approximate tax total out of range")));
    }

    #[test]
    fn test_explicit_net_value_used_verbatim() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <ValoresNfse><ValorIss>50.00</ValorIss><ValorLiquidoNfse>800,10</ValorLiquidoNfse></ValoresNfse>
            <Servico><Valores><ValorServicos>1000.00</ValorServicos></Valores></Servico>
        </InfNfse></Nfse></CompNfse>"#;

        let records = extract_invoices(xml).unwrap();
        assert_eq!(records[0].valor_liquido_nfse, dec("800.10"));
    }

    #[test]
    fn test_irrelevant_document_is_empty() {
        let result = NfseExtractor::new().parse("<html><body>nada</body></html>").unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.dialect, Dialect::Abrasf);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_malformed_document_fails() {
        let err = extract_invoices("<CompNfse><InfNfse></CompNfse>").unwrap_err();
        assert!(matches!(err, NfseError::Xml(_)));
    }

    #[test]
    fn test_missing_iss_retido_defaults_to_not_withheld() {
        let xml = "<r><InfNfse><Numero>1</Numero></InfNfse></r>";
        assert_eq!(extract_invoices(xml).unwrap()[0].iss_retido, 2);

        let xml = "<r><InfNfse><Servico><IssRetido>7</IssRetido></Servico></InfNfse></r>";
        assert_eq!(extract_invoices(xml).unwrap()[0].iss_retido, 2);
    }

    #[test]
    fn test_records_in_document_order_with_unique_ids() {
        let xml = r#"<ListaNfse>
            <CompNfse><Nfse><InfNfse><Numero>1</Numero></InfNfse></Nfse></CompNfse>
            <CompNfse><Nfse><InfNfse><Numero>1</Numero></InfNfse></Nfse></CompNfse>
            <CompNfse><Nfse><InfNfse Id="src"><Numero>3</Numero></InfNfse></Nfse></CompNfse>
        </ListaNfse>"#;

        let records = NfseExtractor::new()
            .with_id_strategy(IdStrategy::Deterministic)
            .extract(xml)
            .unwrap();
        let numbers: Vec<_> = records.iter().map(|r| r.numero.as_str()).collect();
        assert_eq!(numbers, vec!["1", "1", "3"]);
        assert_ne!(records[0].id, records[1].id);
        assert_eq!(records[2].id, "src");

        let again = NfseExtractor::new()
            .with_id_strategy(IdStrategy::Deterministic)
            .extract(xml)
            .unwrap();
        assert_eq!(records, again);
    }

    #[test]
    fn test_text_sanitizing_toggle() {
        let xml = r#"<r><InfNfse><Servico><Discriminacao>Manutenção ??</Discriminacao></Servico></InfNfse></r>"#;

        let clean = NfseExtractor::new().extract(xml).unwrap();
        assert_eq!(clean[0].discriminacao, "Manutencao");

        let raw = NfseExtractor::new().with_text_sanitizing(false).extract(xml).unwrap();
        assert_eq!(raw[0].discriminacao, "Manutenção ??");
    }

    #[test]
    fn test_prefixed_abrasf_document() {
        let xml = r#"<ns2:CompNfse xmlns:ns2="http://www.giss.com.br/tipos-v2_04.xsd">
            <ns2:Nfse><ns2:InfNfse Id="n1">
                <ns2:Numero>00042</ns2:Numero>
                <ns2:ValoresNfse><ns2:ValorIss>1,50</ns2:ValorIss></ns2:ValoresNfse>
                <ns2:DeclaracaoPrestacaoServico><ns2:InfDeclaracaoPrestacaoServico>
                    <ns2:Servico>
                        <ns2:Valores><ns2:ValorServicos>30,00</ns2:ValorServicos></ns2:Valores>
                        <ns2:IssRetido>1</ns2:IssRetido>
                    </ns2:Servico>
                </ns2:InfDeclaracaoPrestacaoServico></ns2:DeclaracaoPrestacaoServico>
            </ns2:InfNfse></ns2:Nfse>
        </ns2:CompNfse>"#;

        let records = extract_invoices(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "n1");
        assert_eq!(records[0].numero, "00042");
        assert_eq!(records[0].iss_retido, 1);
        assert_eq!(records[0].valor_liquido_nfse, dec("28.50"));
    }

    #[test]
    fn test_national_document_end_to_end() {
        let xml = r#"<NFSe xmlns="http://www.sped.fazenda.gov.br/nfse">
          <infNFSe Id="NFS0001">
            <nNFSe>10</nNFSe>
            <emit><CNPJ>11222333000181</CNPJ><xNome>Emissão Ltda</xNome></emit>
            <DPS><infDPS>
              <toma><CNPJ>99888777000166</CNPJ><xNome>Tomadora</xNome></toma>
              <valores>
                <vServPrest><vServ>250.00</vServ></vServPrest>
                <trib><tribMun><tpRetISSQN>2</tpRetISSQN></tribMun></trib>
              </valores>
            </infDPS></DPS>
          </infNFSe>
        </NFSe>"#;

        let result = NfseExtractor::new().parse(xml).unwrap();
        assert_eq!(result.dialect, Dialect::National);
        let record = &result.records[0];
        assert_eq!(record.id, "NFS0001");
        assert_eq!(record.codigo_verificacao, "0001");
        assert_eq!(record.numero, "10");
        assert_eq!(record.prestador_razao_social, "Emissao Ltda");
        assert_eq!(record.tomador_cpf_cnpj, "99888777000166");
        assert_eq!(record.iss_retido, 2);
        assert_eq!(record.valor_servicos, dec("250"));
        assert_eq!(record.valor_liquido_nfse, dec("250"));
    }

    #[test]
    fn test_extractor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NfseExtractor>();
    }
}
