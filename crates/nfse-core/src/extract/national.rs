//! Unified national NFS-e layout (`NFSe/infNFSe`, `DPS/infDPS`).

use roxmltree::Node;
use rust_decimal::Decimal;
use tracing::trace;

use super::DialectRules;
use super::fields::{Field as F, FieldRule, RawFields, at, resolve_table};
use crate::models::invoice::{Dialect, InvoiceRecord};
use crate::normalize::normalize_number;
use crate::xml::{element_text, find_child, find_element};

/// Namespace of the national layout.
pub const NATIONAL_NAMESPACE: &str = "http://www.sped.fazenda.gov.br/nfse";

/// Invoice element of the national layout; its presence selects this dialect.
pub const INVOICE_TAG: &str = "infNFSe";

/// Prefix of the `Id` attribute in front of the access key.
const ACCESS_KEY_PREFIX: &str = "NFS";

/// Sub-nodes of an `infNFSe` that field lookups start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NationalAnchor {
    Invoice,
    /// `infDPS`, or the invoice when absent.
    Declaration,
    /// `emit`
    Issuer,
    /// `emit/enderNac`
    IssuerAddress,
    /// `infDPS/prest`
    Provider,
    /// `infDPS/toma`
    Taker,
    /// `serv/cServ`
    ServiceCode,
    /// Direct `valores` child of `infNFSe`: values computed by the portal.
    InvoiceValues,
    /// Direct `valores` child of `infDPS`: values declared by the issuer.
    DeclarationValues,
    /// `vServPrest`
    ServiceAmounts,
    /// `vDescCondIncond`
    Discounts,
    /// `vDedRed`
    Deductions,
    /// `trib/tribMun`
    MunicipalTax,
    /// `trib/tribFed`
    FederalTax,
    /// `tribFed/piscofins`
    PisCofins,
    /// `IBSCBS/valores`
    IbsCbsValues,
}

use NationalAnchor::*;

/// Field table, most specific location first.
pub const FIELDS: &[FieldRule<NationalAnchor>] = &[
    FieldRule { field: F::Numero, candidates: &[at(Invoice, "nNFSe"), at(Declaration, "nDPS")] },
    FieldRule {
        field: F::DataEmissao,
        candidates: &[at(Declaration, "dhEmi"), at(Invoice, "dhProc")],
    },
    FieldRule {
        field: F::ValorServicos,
        candidates: &[at(ServiceAmounts, "vServ"), at(DeclarationValues, "vServ")],
    },
    FieldRule { field: F::ValorDeducoes, candidates: &[at(Deductions, "vDR")] },
    FieldRule { field: F::ValorPis, candidates: &[at(PisCofins, "vPis")] },
    FieldRule { field: F::ValorCofins, candidates: &[at(PisCofins, "vCofins")] },
    FieldRule { field: F::ValorInss, candidates: &[at(FederalTax, "vRetCP")] },
    FieldRule { field: F::ValorIr, candidates: &[at(FederalTax, "vRetIRRF")] },
    FieldRule { field: F::ValorCsll, candidates: &[at(FederalTax, "vRetCSLL")] },
    FieldRule { field: F::VBcPisCofins, candidates: &[at(PisCofins, "vBCPisCofins")] },
    FieldRule { field: F::VBcIbsCbs, candidates: &[at(IbsCbsValues, "vBC")] },
    FieldRule { field: F::ValorIss, candidates: &[at(InvoiceValues, "vISSQN")] },
    FieldRule { field: F::IssRetido, candidates: &[at(MunicipalTax, "tpRetISSQN")] },
    FieldRule {
        field: F::Aliquota,
        candidates: &[at(InvoiceValues, "pAliqAplic"), at(MunicipalTax, "pAliq")],
    },
    FieldRule { field: F::DescontoIncondicionado, candidates: &[at(Discounts, "vDescIncond")] },
    FieldRule { field: F::DescontoCondicionado, candidates: &[at(Discounts, "vDescCond")] },
    FieldRule { field: F::BaseCalculo, candidates: &[at(InvoiceValues, "vBC")] },
    FieldRule { field: F::ValorLiquidoNfse, candidates: &[at(InvoiceValues, "vLiq")] },
    FieldRule { field: F::ItemListaServico, candidates: &[at(ServiceCode, "cTribNac")] },
    FieldRule { field: F::CodigoTributacaoMunicipio, candidates: &[at(ServiceCode, "cTribMun")] },
    FieldRule {
        field: F::DescricaoCodigoTributacaoMunicipio,
        candidates: &[at(Invoice, "xTribMun"), at(Invoice, "xTribNac")],
    },
    FieldRule { field: F::Discriminacao, candidates: &[at(ServiceCode, "xDescServ")] },
    FieldRule {
        field: F::PrestadorRazaoSocial,
        candidates: &[at(Issuer, "xNome"), at(Provider, "xNome")],
    },
    FieldRule {
        field: F::PrestadorCnpj,
        candidates: &[
            at(Issuer, "CNPJ"),
            at(Issuer, "CPF"),
            at(Provider, "CNPJ"),
            at(Provider, "CPF"),
        ],
    },
    FieldRule { field: F::TomadorRazaoSocial, candidates: &[at(Taker, "xNome")] },
    FieldRule {
        field: F::TomadorCpfCnpj,
        candidates: &[at(Taker, "CNPJ"), at(Taker, "CPF")],
    },
    FieldRule {
        field: F::CodigoMunicipio,
        candidates: &[at(Invoice, "cLocIncid"), at(IssuerAddress, "cMun")],
    },
    FieldRule { field: F::Uf, candidates: &[at(IssuerAddress, "UF")] },
];

/// Parts of `vTotTrib` summed into `valTotTributos`.
const TOTAL_TAX_PARTS: &[&str] = &["vTotTribFed", "vTotTribEst", "vTotTribMun"];

struct Anchors<'a, 'input> {
    invoice: Node<'a, 'input>,
    declaration: Node<'a, 'input>,
    issuer: Option<Node<'a, 'input>>,
    issuer_address: Option<Node<'a, 'input>>,
    provider: Option<Node<'a, 'input>>,
    taker: Option<Node<'a, 'input>>,
    service_code: Option<Node<'a, 'input>>,
    invoice_values: Option<Node<'a, 'input>>,
    declaration_values: Option<Node<'a, 'input>>,
    service_amounts: Option<Node<'a, 'input>>,
    discounts: Option<Node<'a, 'input>>,
    deductions: Option<Node<'a, 'input>>,
    municipal_tax: Option<Node<'a, 'input>>,
    federal_tax: Option<Node<'a, 'input>>,
    pis_cofins: Option<Node<'a, 'input>>,
    total_taxes: Option<Node<'a, 'input>>,
    ibs_cbs_values: Option<Node<'a, 'input>>,
}

impl<'a, 'input> Anchors<'a, 'input> {
    fn locate(invoice: Node<'a, 'input>) -> Self {
        let declaration = find_element(invoice, "infDPS").unwrap_or(invoice);
        let issuer = find_child(invoice, "emit");
        let declaration_values = if declaration == invoice {
            None
        } else {
            find_child(declaration, "valores")
        };
        let federal_tax = declaration_values.and_then(|v| find_element(v, "tribFed"));

        Self {
            invoice,
            declaration,
            issuer,
            issuer_address: issuer.and_then(|e| find_element(e, "enderNac")),
            provider: find_element(declaration, "prest"),
            taker: find_element(declaration, "toma"),
            service_code: find_element(declaration, "serv").and_then(|s| find_element(s, "cServ")),
            invoice_values: find_child(invoice, "valores"),
            declaration_values,
            service_amounts: declaration_values.and_then(|v| find_element(v, "vServPrest")),
            discounts: declaration_values.and_then(|v| find_element(v, "vDescCondIncond")),
            deductions: declaration_values.and_then(|v| find_element(v, "vDedRed")),
            municipal_tax: declaration_values.and_then(|v| find_element(v, "tribMun")),
            federal_tax,
            pis_cofins: federal_tax.and_then(|t| find_element(t, "piscofins")),
            total_taxes: declaration_values.and_then(|v| find_element(v, "vTotTrib")),
            ibs_cbs_values: find_element(declaration, "IBSCBS")
                .and_then(|g| find_child(g, "valores")),
        }
    }

    fn get(&self, anchor: NationalAnchor) -> Option<Node<'a, 'input>> {
        match anchor {
            Invoice => Some(self.invoice),
            Declaration => Some(self.declaration),
            Issuer => self.issuer,
            IssuerAddress => self.issuer_address,
            Provider => self.provider,
            Taker => self.taker,
            ServiceCode => self.service_code,
            InvoiceValues => self.invoice_values,
            DeclarationValues => self.declaration_values,
            ServiceAmounts => self.service_amounts,
            Discounts => self.discounts,
            Deductions => self.deductions,
            MunicipalTax => self.municipal_tax,
            FederalTax => self.federal_tax,
            PisCofins => self.pis_cofins,
            IbsCbsValues => self.ibs_cbs_values,
        }
    }

    /// Sum of the federal, state and municipal approximate tax totals.
    ///
    /// The flag is set when the sum left the decimal range and was capped.
    fn total_taxes(&self) -> Option<(Decimal, bool)> {
        let node = self.total_taxes?;
        let parts: Vec<Decimal> = TOTAL_TAX_PARTS
            .iter()
            .filter_map(|tag| element_text(node, tag))
            .map(|text| normalize_number(&text))
            .collect();

        if parts.is_empty() {
            return None;
        }

        let mut capped = false;
        let total = parts.into_iter().fold(Decimal::ZERO, |acc, part| {
            acc.checked_add(part).unwrap_or_else(|| {
                capped = true;
                acc.saturating_add(part)
            })
        });
        Some((total, capped))
    }

    /// Access key carried in the `Id` attribute, e.g. `NFS3550308...`.
    fn access_key(&self) -> Option<&'a str> {
        let id = self.invoice.attribute("Id")?.trim();
        let key = id.strip_prefix(ACCESS_KEY_PREFIX).unwrap_or(id);
        (!key.is_empty()).then_some(key)
    }
}

/// Rules for the national dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NationalRules;

impl DialectRules for NationalRules {
    fn dialect(&self) -> Dialect {
        Dialect::National
    }

    fn invoice_tag(&self) -> &'static str {
        INVOICE_TAG
    }

    fn read_fields(&self, invoice: Node<'_, '_>) -> RawFields {
        let anchors = Anchors::locate(invoice);
        trace!(
            has_declaration = anchors.declaration != anchors.invoice,
            has_invoice_values = anchors.invoice_values.is_some(),
            has_declaration_values = anchors.declaration_values.is_some(),
            "located national anchors"
        );

        let mut raw = resolve_table(FIELDS, |anchor| anchors.get(anchor));
        if let Some((total, capped)) = anchors.total_taxes() {
            if capped {
                raw.note(format!("approximate tax total out of range, capped at {}", total));
            }
            raw.insert(F::ValTotTributos, total.to_string());
        }
        if let Some(key) = anchors.access_key() {
            raw.insert(F::CodigoVerificacao, key);
        }
        raw
    }

    /// The portal always computes `vLiq`; without it the gross value is the best guess.
    fn derive_net_value(&self, record: &InvoiceRecord) -> Option<Decimal> {
        Some(record.valor_servicos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use roxmltree::Document;

    const NFSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<NFSe xmlns="http://www.sped.fazenda.gov.br/nfse" versao="1.00">
  <infNFSe Id="NFS35503082211222333000181000000000001234">
    <xLocEmi>São Paulo</xLocEmi>
    <nNFSe>1234</nNFSe>
    <cLocIncid>3550308</cLocIncid>
    <xTribNac>Suporte técnico em informática</xTribNac>
    <dhProc>2024-05-02T09:15:00-03:00</dhProc>
    <emit>
      <CNPJ>11222333000181</CNPJ>
      <xNome>Emissora Serviços LTDA</xNome>
      <enderNac><cMun>3550308</cMun><UF>SP</UF></enderNac>
    </emit>
    <valores>
      <vBC>1900.00</vBC>
      <pAliqAplic>2.00</pAliqAplic>
      <vISSQN>38.00</vISSQN>
      <vLiq>1862.00</vLiq>
    </valores>
    <DPS versao="1.00">
      <infDPS Id="DPS1">
        <dhEmi>2024-05-01T18:00:00-03:00</dhEmi>
        <nDPS>55</nDPS>
        <prest><CNPJ>11222333000181</CNPJ></prest>
        <toma><CPF>12345678909</CPF><xNome>José Tomador</xNome></toma>
        <serv>
          <cServ><cTribNac>010701</cTribNac><cTribMun>001</cTribMun><xDescServ>Suporte mensal</xDescServ></cServ>
        </serv>
        <valores>
          <vServPrest><vServ>2000.00</vServ></vServPrest>
          <vDescCondIncond><vDescIncond>100.00</vDescIncond><vDescCond>0.00</vDescCond></vDescCondIncond>
          <trib>
            <tribMun><tribISSQN>1</tribISSQN><tpRetISSQN>1</tpRetISSQN><pAliq>2.00</pAliq></tribMun>
            <tribFed>
              <piscofins><vBCPisCofins>1900.00</vBCPisCofins><vPis>12.35</vPis><vCofins>57.00</vCofins></piscofins>
              <vRetCP>0.00</vRetCP><vRetIRRF>28.50</vRetIRRF><vRetCSLL>19.00</vRetCSLL>
            </tribFed>
            <totTrib><vTotTrib><vTotTribFed>116.85</vTotTribFed><vTotTribEst>0.00</vTotTribEst><vTotTribMun>38.00</vTotTribMun></vTotTrib></totTrib>
          </trib>
        </valores>
        <IBSCBS><valores><vBC>1900.00</vBC></valores></IBSCBS>
      </infDPS>
    </DPS>
  </infNFSe>
</NFSe>"#;

    fn read(xml: &str) -> RawFields {
        let doc = Document::parse(xml).unwrap();
        let node = find_element(doc.root(), INVOICE_TAG).unwrap();
        NationalRules.read_fields(node)
    }

    #[test]
    fn test_reads_full_layout() {
        let raw = read(NFSE);
        assert_eq!(raw.get(F::Numero), Some("1234"));
        assert_eq!(raw.get(F::DataEmissao), Some("2024-05-01T18:00:00-03:00"));
        assert_eq!(raw.get(F::ValorServicos), Some("2000.00"));
        assert_eq!(raw.get(F::ValorIss), Some("38.00"));
        assert_eq!(raw.get(F::ValorLiquidoNfse), Some("1862.00"));
        assert_eq!(raw.get(F::BaseCalculo), Some("1900.00"));
        assert_eq!(raw.get(F::Aliquota), Some("2.00"));
        assert_eq!(raw.get(F::IssRetido), Some("1"));
        assert_eq!(raw.get(F::ValorPis), Some("12.35"));
        assert_eq!(raw.get(F::ValorIr), Some("28.50"));
        assert_eq!(raw.get(F::ValorCsll), Some("19.00"));
        assert_eq!(raw.get(F::DescontoIncondicionado), Some("100.00"));
        assert_eq!(raw.get(F::VBcIbsCbs), Some("1900.00"));
        assert_eq!(raw.get(F::ItemListaServico), Some("010701"));
        assert_eq!(raw.get(F::Discriminacao), Some("Suporte mensal"));
        assert_eq!(raw.get(F::DescricaoCodigoTributacaoMunicipio), Some("Suporte técnico em informática"));
        assert_eq!(raw.get(F::PrestadorRazaoSocial), Some("Emissora Serviços LTDA"));
        assert_eq!(raw.get(F::PrestadorCnpj), Some("11222333000181"));
        assert_eq!(raw.get(F::TomadorCpfCnpj), Some("12345678909"));
        assert_eq!(raw.get(F::TomadorRazaoSocial), Some("José Tomador"));
        assert_eq!(raw.get(F::CodigoMunicipio), Some("3550308"));
        assert_eq!(raw.get(F::Uf), Some("SP"));
        assert_eq!(raw.get(F::CodigoCnae), None);
    }

    #[test]
    fn test_total_taxes_are_summed() {
        let raw = read(NFSE);
        assert_eq!(normalize_number(raw.get(F::ValTotTributos).unwrap()), Decimal::new(15485, 2));
    }

    #[test]
    fn test_access_key_from_id() {
        let raw = read(NFSE);
        assert_eq!(
            raw.get(F::CodigoVerificacao),
            Some("35503082211222333000181000000000001234")
        );
    }

    #[test]
    fn test_declaration_values_not_mistaken_for_invoice_values() {
        let xml = r#"<NFSe><infNFSe><nNFSe>1</nNFSe><DPS><infDPS>
            <valores><vServPrest><vServ>500,00</vServ></vServPrest></valores>
        </infDPS></DPS></infNFSe></NFSe>"#;
        let raw = read(xml);
        assert_eq!(raw.get(F::ValorServicos), Some("500,00"));
        assert_eq!(raw.get(F::ValorLiquidoNfse), None);
        assert_eq!(raw.get(F::ValorIss), None);
        assert_eq!(raw.get(F::BaseCalculo), None);
    }

    #[test]
    fn test_net_value_falls_back_to_gross() {
        let record = InvoiceRecord {
            valor_servicos: Decimal::new(500, 0),
            valor_iss: Decimal::new(10, 0),
            ..Default::default()
        };
        assert_eq!(NationalRules.derive_net_value(&record), Some(Decimal::new(500, 0)));
    }

    #[test]
    fn test_total_taxes_capped_when_out_of_range() {
        let xml = r#"<NFSe><infNFSe><nNFSe>9</nNFSe><DPS><infDPS><valores><trib>
            <totTrib><vTotTrib>
              <vTotTribFed>79228162514264337593543950335</vTotTribFed>
              <vTotTribEst>79228162514264337593543950335</vTotTribEst>
            </vTotTrib></totTrib>
        </trib></valores></infDPS></DPS></infNFSe></NFSe>"#;
        let raw = read(xml);
        assert_eq!(normalize_number(raw.get(F::ValTotTributos).unwrap()), Decimal::MAX);
        assert_eq!(raw.notes().len(), 1);
        assert!(raw.notes()[0].starts_with("approximate tax total out of range"));
    }

    #[test]
    fn test_total_taxes_in_range_have_no_notes() {
        assert!(read(NFSE).notes().is_empty());
    }
}
