//! NFS-e record model shared by every supported dialect.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `issRetido` value for ISS withheld at source by the taker.
pub const ISS_WITHHELD: u8 = 1;

/// `issRetido` value for ISS not withheld.
pub const ISS_NOT_WITHHELD: u8 = 2;

/// One service invoice, flattened into a uniform shape.
///
/// Every field is always populated: text defaults to an empty string, amounts
/// to zero and `iss_retido` to [`ISS_NOT_WITHHELD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceRecord {
    /// Node `Id` attribute, or a synthesized id unique within one extraction.
    pub id: String,

    /// Invoice number, kept as text (leading zeros, series prefixes).
    pub numero: String,

    /// Verification code (ABRASF) or access key (national).
    pub codigo_verificacao: String,

    /// Issue date exactly as written in the source.
    pub data_emissao: String,

    /// Gross value of the services.
    pub valor_servicos: Decimal,

    pub valor_deducoes: Decimal,
    pub valor_pis: Decimal,
    pub valor_cofins: Decimal,
    pub valor_inss: Decimal,
    pub valor_ir: Decimal,
    pub valor_csll: Decimal,

    /// Approximate total of taxes reported on the invoice.
    pub val_tot_tributos: Decimal,

    /// PIS/COFINS calculation base.
    #[serde(rename = "vBCPisCofins")]
    pub v_bc_pis_cofins: Decimal,

    /// IBS/CBS calculation base (tax reform group).
    #[serde(rename = "vBC_IBSCBS")]
    pub v_bc_ibs_cbs: Decimal,

    pub outras_retencoes: Decimal,
    pub valor_iss: Decimal,

    /// 1 = withheld, 2 = not withheld.
    pub iss_retido: u8,

    /// ISS rate as written by the issuer (percentage or fraction).
    pub aliquota: Decimal,

    pub desconto_incondicionado: Decimal,
    pub desconto_condicionado: Decimal,
    pub base_calculo: Decimal,

    /// Net value, taken from the source or derived from the gross value.
    pub valor_liquido_nfse: Decimal,

    pub item_lista_servico: String,
    pub codigo_cnae: String,
    pub codigo_tributacao_municipio: String,
    pub descricao_codigo_tributacao_municipio: String,

    /// Free-text service description.
    pub discriminacao: String,

    pub prestador_razao_social: String,
    pub prestador_cnpj: String,
    pub tomador_razao_social: String,
    pub tomador_cpf_cnpj: String,

    /// IBGE municipality code.
    pub codigo_municipio: String,

    /// State abbreviation.
    pub uf: String,
}

impl Default for InvoiceRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            numero: String::new(),
            codigo_verificacao: String::new(),
            data_emissao: String::new(),
            valor_servicos: Decimal::ZERO,
            valor_deducoes: Decimal::ZERO,
            valor_pis: Decimal::ZERO,
            valor_cofins: Decimal::ZERO,
            valor_inss: Decimal::ZERO,
            valor_ir: Decimal::ZERO,
            valor_csll: Decimal::ZERO,
            val_tot_tributos: Decimal::ZERO,
            v_bc_pis_cofins: Decimal::ZERO,
            v_bc_ibs_cbs: Decimal::ZERO,
            outras_retencoes: Decimal::ZERO,
            valor_iss: Decimal::ZERO,
            iss_retido: ISS_NOT_WITHHELD,
            aliquota: Decimal::ZERO,
            desconto_incondicionado: Decimal::ZERO,
            desconto_condicionado: Decimal::ZERO,
            base_calculo: Decimal::ZERO,
            valor_liquido_nfse: Decimal::ZERO,
            item_lista_servico: String::new(),
            codigo_cnae: String::new(),
            codigo_tributacao_municipio: String::new(),
            descricao_codigo_tributacao_municipio: String::new(),
            discriminacao: String::new(),
            prestador_razao_social: String::new(),
            prestador_cnpj: String::new(),
            tomador_razao_social: String::new(),
            tomador_cpf_cnpj: String::new(),
            codigo_municipio: String::new(),
            uf: String::new(),
        }
    }
}

impl InvoiceRecord {
    /// Whether ISS was withheld at source.
    pub fn is_iss_withheld(&self) -> bool {
        self.iss_retido == ISS_WITHHELD
    }

    /// Key callers use to drop the same invoice seen in several files.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.numero, &self.prestador_cnpj)
    }

    /// Check the record for gaps worth reporting. Never fails extraction.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.numero.is_empty() {
            issues.push("Missing invoice number".to_string());
        }

        if self.prestador_cnpj.is_empty() {
            issues.push("Missing provider CNPJ/CPF".to_string());
        }

        if self.tomador_razao_social.is_empty() && self.tomador_cpf_cnpj.is_empty() {
            issues.push("Missing taker information".to_string());
        }

        if self.valor_servicos == Decimal::ZERO {
            issues.push("Service value is zero".to_string());
        }

        if self.valor_liquido_nfse > self.valor_servicos {
            issues.push(format!(
                "Net value ({}) exceeds service value ({})",
                self.valor_liquido_nfse, self.valor_servicos
            ));
        }

        if self.iss_retido != ISS_WITHHELD && self.iss_retido != ISS_NOT_WITHHELD {
            issues.push(format!("Unexpected issRetido value {}", self.iss_retido));
        }

        issues
    }
}

/// Column totals across a set of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTotals {
    /// Number of records summed.
    pub count: usize,
    pub valor_servicos: Decimal,
    pub valor_liquido_nfse: Decimal,
    pub valor_iss: Decimal,
    pub valor_pis: Decimal,
    pub valor_cofins: Decimal,
    pub valor_csll: Decimal,
    pub valor_ir: Decimal,
    pub valor_inss: Decimal,
    pub val_tot_tributos: Decimal,
    #[serde(rename = "vBCPisCofins")]
    pub v_bc_pis_cofins: Decimal,
    #[serde(rename = "vBC_IBSCBS")]
    pub v_bc_ibs_cbs: Decimal,
    /// Set when some column left the decimal range and was capped.
    #[serde(default)]
    pub saturated: bool,
}

impl RecordTotals {
    /// Sum the monetary columns of `records`.
    ///
    /// Sums that leave the decimal range stop at `Decimal::MAX` (or `MIN`)
    /// and set [`RecordTotals::saturated`].
    pub fn from_records(records: &[InvoiceRecord]) -> Self {
        let mut t = Self::default();
        for r in records {
            t.count += 1;
            let capped = &mut t.saturated;
            accumulate(&mut t.valor_servicos, r.valor_servicos, capped);
            accumulate(&mut t.valor_liquido_nfse, r.valor_liquido_nfse, capped);
            accumulate(&mut t.valor_iss, r.valor_iss, capped);
            accumulate(&mut t.valor_pis, r.valor_pis, capped);
            accumulate(&mut t.valor_cofins, r.valor_cofins, capped);
            accumulate(&mut t.valor_csll, r.valor_csll, capped);
            accumulate(&mut t.valor_ir, r.valor_ir, capped);
            accumulate(&mut t.valor_inss, r.valor_inss, capped);
            accumulate(&mut t.val_tot_tributos, r.val_tot_tributos, capped);
            accumulate(&mut t.v_bc_pis_cofins, r.v_bc_pis_cofins, capped);
            accumulate(&mut t.v_bc_ibs_cbs, r.v_bc_ibs_cbs, capped);
        }
        t
    }
}

fn accumulate(total: &mut Decimal, value: Decimal, capped: &mut bool) {
    let current = *total;
    *total = match current.checked_add(value) {
        Some(sum) => sum,
        None => {
            *capped = true;
            current.saturating_add(value)
        }
    };
}

/// XML vocabulary a document was read with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Legacy municipal standard (GISS/ABRASF and derivatives).
    #[default]
    Abrasf,
    /// Unified national standard.
    National,
}

impl Dialect {
    /// Human readable name.
    pub fn display(&self) -> &'static str {
        match self {
            Dialect::Abrasf => "GISS/ABRASF",
            Dialect::National => "NFS-e Nacional",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_default_record_is_fully_populated() {
        let record = InvoiceRecord::default();
        assert_eq!(record.iss_retido, ISS_NOT_WITHHELD);
        assert_eq!(record.valor_liquido_nfse, Decimal::ZERO);
        assert!(!record.is_iss_withheld());
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(InvoiceRecord::default()).unwrap();
        let obj = json.as_object().unwrap();

        for key in [
            "id",
            "numero",
            "codigoVerificacao",
            "dataEmissao",
            "valorServicos",
            "valTotTributos",
            "vBCPisCofins",
            "vBC_IBSCBS",
            "issRetido",
            "valorLiquidoNfse",
            "descricaoCodigoTributacaoMunicipio",
            "tomadorCpfCnpj",
            "uf",
        ] {
            assert!(obj.contains_key(key), "missing key {key}");
        }
        assert_eq!(obj.len(), 33);
    }

    #[test]
    fn test_deserialize_partial_record_fills_defaults() {
        let record: InvoiceRecord =
            serde_json::from_str(r#"{"numero": "42", "valorServicos": "10.5"}"#).unwrap();
        assert_eq!(record.numero, "42");
        assert_eq!(record.valor_servicos, dec("10.5"));
        assert_eq!(record.iss_retido, ISS_NOT_WITHHELD);
    }

    #[test]
    fn test_validate_reports_gaps() {
        let record = InvoiceRecord::default();
        let issues = record.validate();
        assert!(issues.contains(&"Missing invoice number".to_string()));
        assert!(issues.contains(&"Service value is zero".to_string()));

        let record = InvoiceRecord {
            numero: "1".into(),
            prestador_cnpj: "11222333000181".into(),
            tomador_razao_social: "Cliente".into(),
            valor_servicos: dec("100"),
            valor_liquido_nfse: dec("95"),
            ..Default::default()
        };
        assert!(record.validate().is_empty());
    }

    #[test]
    fn test_totals() {
        let records = vec![
            InvoiceRecord {
                valor_servicos: dec("100.10"),
                valor_iss: dec("5"),
                valor_liquido_nfse: dec("95.10"),
                ..Default::default()
            },
            InvoiceRecord {
                valor_servicos: dec("0.20"),
                valor_liquido_nfse: dec("0.20"),
                ..Default::default()
            },
        ];

        let totals = RecordTotals::from_records(&records);
        assert_eq!(totals.count, 2);
        assert_eq!(totals.valor_servicos, dec("100.30"));
        assert_eq!(totals.valor_liquido_nfse, dec("95.30"));
        assert_eq!(totals.valor_iss, dec("5"));
        assert!(!totals.saturated);
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let records = vec![
            InvoiceRecord {
                valor_servicos: Decimal::MAX,
                valor_iss: dec("2"),
                ..Default::default()
            },
            InvoiceRecord {
                valor_servicos: dec("1"),
                valor_iss: dec("3"),
                ..Default::default()
            },
        ];

        let totals = RecordTotals::from_records(&records);
        assert_eq!(totals.count, 2);
        assert!(totals.saturated);
        assert_eq!(totals.valor_servicos, Decimal::MAX);
        assert_eq!(totals.valor_iss, dec("5"));

        let negative = InvoiceRecord {
            valor_servicos: Decimal::MIN,
            ..Default::default()
        };
        let totals = RecordTotals::from_records(&[negative.clone(), negative]);
        assert_eq!(totals.valor_servicos, Decimal::MIN);
        assert!(totals.saturated);
    }

    #[test]
    fn test_dedup_key() {
        let record = InvoiceRecord {
            numero: "7".into(),
            prestador_cnpj: "123".into(),
            ..Default::default()
        };
        assert_eq!(record.dedup_key(), ("7", "123"));
    }
}
