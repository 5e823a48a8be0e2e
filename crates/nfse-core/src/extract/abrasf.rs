//! GISS/ABRASF municipal layout.
//!
//! Federal taxes usually sit under `Servico/Valores` while ISS and the net
//! value sit under `ValoresNfse`, but producers disagree, so most fields list
//! both places.

use roxmltree::Node;
use rust_decimal::Decimal;
use tracing::trace;

use super::DialectRules;
use super::fields::{FieldRule, RawFields, at, resolve_table};
use crate::models::invoice::{Dialect, InvoiceRecord};
use crate::xml::find_element;

/// Invoice element of the ABRASF layout.
pub const INVOICE_TAG: &str = "InfNfse";

/// Sub-nodes of an `InfNfse` that field lookups start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbrasfAnchor {
    /// The `InfNfse` node itself.
    Invoice,
    /// `InfDeclaracaoPrestacaoServico`, or the invoice when absent.
    Declaration,
    Service,
    /// `Servico/Valores`.
    ServiceValues,
    /// `ValoresNfse`.
    InvoiceValues,
    /// `Valores/piscofins` (tax reform layouts).
    PisCofins,
    /// `Valores/IBSCBS/valores`.
    IbsCbsValues,
    Provider,
    ProviderDocument,
    Taker,
    TakerDocument,
    /// `OrgaoGerador`.
    IssuingAgency,
}

use AbrasfAnchor::*;
use super::fields::Field as F;

/// Field table, most specific location first.
pub const FIELDS: &[FieldRule<AbrasfAnchor>] = &[
    FieldRule { field: F::Numero, candidates: &[at(Invoice, "Numero")] },
    FieldRule { field: F::CodigoVerificacao, candidates: &[at(Invoice, "CodigoVerificacao")] },
    FieldRule { field: F::DataEmissao, candidates: &[at(Invoice, "DataEmissao")] },
    FieldRule {
        field: F::ValorServicos,
        candidates: &[
            at(ServiceValues, "ValorServicos"),
            at(InvoiceValues, "ValorServicos"),
            at(Invoice, "ValorServicos"),
        ],
    },
    FieldRule { field: F::ValorDeducoes, candidates: &[at(ServiceValues, "ValorDeducoes")] },
    FieldRule {
        field: F::ValorPis,
        candidates: &[at(ServiceValues, "ValorPis"), at(PisCofins, "vPis")],
    },
    FieldRule {
        field: F::ValorCofins,
        candidates: &[at(ServiceValues, "ValorCofins"), at(PisCofins, "vCofins")],
    },
    FieldRule { field: F::ValorInss, candidates: &[at(ServiceValues, "ValorInss")] },
    FieldRule { field: F::ValorIr, candidates: &[at(ServiceValues, "ValorIr")] },
    FieldRule { field: F::ValorCsll, candidates: &[at(ServiceValues, "ValorCsll")] },
    FieldRule { field: F::ValTotTributos, candidates: &[at(ServiceValues, "ValTotTributos")] },
    FieldRule { field: F::VBcPisCofins, candidates: &[at(PisCofins, "vBCPisCofins")] },
    FieldRule { field: F::VBcIbsCbs, candidates: &[at(IbsCbsValues, "vBC")] },
    FieldRule { field: F::OutrasRetencoes, candidates: &[at(ServiceValues, "OutrasRetencoes")] },
    FieldRule {
        field: F::ValorIss,
        candidates: &[at(InvoiceValues, "ValorIss"), at(ServiceValues, "ValorIss")],
    },
    FieldRule {
        field: F::IssRetido,
        candidates: &[
            at(InvoiceValues, "IssRetido"),
            at(ServiceValues, "IssRetido"),
            at(Service, "IssRetido"),
        ],
    },
    FieldRule {
        field: F::Aliquota,
        candidates: &[at(InvoiceValues, "Aliquota"), at(ServiceValues, "Aliquota")],
    },
    FieldRule {
        field: F::DescontoIncondicionado,
        candidates: &[at(ServiceValues, "DescontoIncondicionado")],
    },
    FieldRule {
        field: F::DescontoCondicionado,
        candidates: &[at(ServiceValues, "DescontoCondicionado")],
    },
    FieldRule {
        field: F::BaseCalculo,
        candidates: &[at(InvoiceValues, "BaseCalculo"), at(ServiceValues, "vBC")],
    },
    FieldRule { field: F::ValorLiquidoNfse, candidates: &[at(InvoiceValues, "ValorLiquidoNfse")] },
    FieldRule { field: F::ItemListaServico, candidates: &[at(Service, "ItemListaServico")] },
    FieldRule { field: F::CodigoCnae, candidates: &[at(Service, "CodigoCnae")] },
    FieldRule {
        field: F::CodigoTributacaoMunicipio,
        candidates: &[at(Service, "CodigoTributacaoMunicipio")],
    },
    FieldRule {
        field: F::DescricaoCodigoTributacaoMunicipio,
        candidates: &[at(Service, "DescricaoCodigoTributacaoMunicipio")],
    },
    FieldRule { field: F::Discriminacao, candidates: &[at(Service, "Discriminacao")] },
    FieldRule { field: F::PrestadorRazaoSocial, candidates: &[at(Provider, "RazaoSocial")] },
    FieldRule {
        field: F::PrestadorCnpj,
        candidates: &[at(Provider, "Cnpj"), at(ProviderDocument, "Cnpj")],
    },
    FieldRule {
        field: F::TomadorRazaoSocial,
        candidates: &[at(Taker, "RazaoSocial"), at(Taker, "Nome")],
    },
    FieldRule {
        field: F::TomadorCpfCnpj,
        candidates: &[
            at(TakerDocument, "Cnpj"),
            at(TakerDocument, "Cpf"),
            at(Taker, "Cnpj"),
            at(Taker, "Cpf"),
        ],
    },
    FieldRule { field: F::CodigoMunicipio, candidates: &[at(IssuingAgency, "CodigoMunicipio")] },
    FieldRule { field: F::Uf, candidates: &[at(IssuingAgency, "Uf")] },
];

/// Anchor nodes located once per invoice.
struct Anchors<'a, 'input> {
    invoice: Node<'a, 'input>,
    declaration: Node<'a, 'input>,
    service: Option<Node<'a, 'input>>,
    service_values: Option<Node<'a, 'input>>,
    invoice_values: Option<Node<'a, 'input>>,
    pis_cofins: Option<Node<'a, 'input>>,
    ibs_cbs_values: Option<Node<'a, 'input>>,
    provider: Option<Node<'a, 'input>>,
    provider_document: Option<Node<'a, 'input>>,
    taker: Option<Node<'a, 'input>>,
    taker_document: Option<Node<'a, 'input>>,
    issuing_agency: Option<Node<'a, 'input>>,
}

impl<'a, 'input> Anchors<'a, 'input> {
    fn locate(invoice: Node<'a, 'input>) -> Self {
        let declaration =
            find_element(invoice, "InfDeclaracaoPrestacaoServico").unwrap_or(invoice);
        let service = find_element(declaration, "Servico");
        let service_values = service.and_then(|s| find_element(s, "Valores"));
        let pis_cofins = service_values.and_then(|v| find_element(v, "piscofins"));
        let ibs_cbs_values = service_values
            .and_then(|v| find_element(v, "IBSCBS"))
            .and_then(|g| find_element(g, "valores"));

        let provider = find_element(invoice, "PrestadorServico")
            .or_else(|| find_element(invoice, "Prestador"))
            .or_else(|| find_element(declaration, "Prestador"));
        let taker = find_element(invoice, "TomadorServico")
            .or_else(|| find_element(invoice, "Tomador"))
            .or_else(|| find_element(declaration, "TomadorServico"));

        Self {
            invoice,
            declaration,
            service,
            service_values,
            invoice_values: find_element(invoice, "ValoresNfse"),
            pis_cofins,
            ibs_cbs_values,
            provider,
            provider_document: provider.and_then(|p| find_element(p, "CpfCnpj")),
            taker,
            taker_document: taker.and_then(|t| find_element(t, "CpfCnpj")),
            issuing_agency: find_element(invoice, "OrgaoGerador"),
        }
    }

    fn get(&self, anchor: AbrasfAnchor) -> Option<Node<'a, 'input>> {
        match anchor {
            Invoice => Some(self.invoice),
            Declaration => Some(self.declaration),
            Service => self.service,
            ServiceValues => self.service_values,
            InvoiceValues => self.invoice_values,
            PisCofins => self.pis_cofins,
            IbsCbsValues => self.ibs_cbs_values,
            Provider => self.provider,
            ProviderDocument => self.provider_document,
            Taker => self.taker,
            TakerDocument => self.taker_document,
            IssuingAgency => self.issuing_agency,
        }
    }
}

/// Rules for the GISS/ABRASF dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbrasfRules;

impl DialectRules for AbrasfRules {
    fn dialect(&self) -> Dialect {
        Dialect::Abrasf
    }

    fn invoice_tag(&self) -> &'static str {
        INVOICE_TAG
    }

    fn read_fields(&self, invoice: Node<'_, '_>) -> RawFields {
        let anchors = Anchors::locate(invoice);
        trace!(
            has_service = anchors.service.is_some(),
            has_service_values = anchors.service_values.is_some(),
            has_invoice_values = anchors.invoice_values.is_some(),
            "located ABRASF anchors"
        );
        resolve_table(FIELDS, |anchor| anchors.get(anchor))
    }

    /// Gross value minus ISS.
    fn derive_net_value(&self, record: &InvoiceRecord) -> Option<Decimal> {
        record.valor_servicos.checked_sub(record.valor_iss)
    }
}
