//! Declarative field tables and the "first non-empty wins" resolver.

use std::collections::HashMap;

use roxmltree::Node;
use rust_decimal::Decimal;

use crate::models::invoice::InvoiceRecord;
use crate::normalize::{normalize_number, parse_iss_withholding, sanitize_text};
use crate::xml::element_text;

/// Every value an [`InvoiceRecord`] receives from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Numero,
    CodigoVerificacao,
    DataEmissao,
    ValorServicos,
    ValorDeducoes,
    ValorPis,
    ValorCofins,
    ValorInss,
    ValorIr,
    ValorCsll,
    ValTotTributos,
    VBcPisCofins,
    VBcIbsCbs,
    OutrasRetencoes,
    ValorIss,
    IssRetido,
    Aliquota,
    DescontoIncondicionado,
    DescontoCondicionado,
    BaseCalculo,
    ValorLiquidoNfse,
    ItemListaServico,
    CodigoCnae,
    CodigoTributacaoMunicipio,
    DescricaoCodigoTributacaoMunicipio,
    Discriminacao,
    PrestadorRazaoSocial,
    PrestadorCnpj,
    TomadorRazaoSocial,
    TomadorCpfCnpj,
    CodigoMunicipio,
    Uf,
}

/// How a raw value is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Amount,
    Withholding,
}

impl Field {
    /// Number of fields a document can fill (every record field except `id`).
    pub const COUNT: usize = 32;

    /// Every field, in record order.
    pub const ALL: [Field; Field::COUNT] = [
        Field::Numero,
        Field::CodigoVerificacao,
        Field::DataEmissao,
        Field::ValorServicos,
        Field::ValorDeducoes,
        Field::ValorPis,
        Field::ValorCofins,
        Field::ValorInss,
        Field::ValorIr,
        Field::ValorCsll,
        Field::ValTotTributos,
        Field::VBcPisCofins,
        Field::VBcIbsCbs,
        Field::OutrasRetencoes,
        Field::ValorIss,
        Field::IssRetido,
        Field::Aliquota,
        Field::DescontoIncondicionado,
        Field::DescontoCondicionado,
        Field::BaseCalculo,
        Field::ValorLiquidoNfse,
        Field::ItemListaServico,
        Field::CodigoCnae,
        Field::CodigoTributacaoMunicipio,
        Field::DescricaoCodigoTributacaoMunicipio,
        Field::Discriminacao,
        Field::PrestadorRazaoSocial,
        Field::PrestadorCnpj,
        Field::TomadorRazaoSocial,
        Field::TomadorCpfCnpj,
        Field::CodigoMunicipio,
        Field::Uf,
    ];

    /// Name of the field in serialized records.
    pub fn name(self) -> &'static str {
        match self {
            Field::Numero => "numero",
            Field::CodigoVerificacao => "codigoVerificacao",
            Field::DataEmissao => "dataEmissao",
            Field::ValorServicos => "valorServicos",
            Field::ValorDeducoes => "valorDeducoes",
            Field::ValorPis => "valorPis",
            Field::ValorCofins => "valorCofins",
            Field::ValorInss => "valorInss",
            Field::ValorIr => "valorIr",
            Field::ValorCsll => "valorCsll",
            Field::ValTotTributos => "valTotTributos",
            Field::VBcPisCofins => "vBCPisCofins",
            Field::VBcIbsCbs => "vBC_IBSCBS",
            Field::OutrasRetencoes => "outrasRetencoes",
            Field::ValorIss => "valorIss",
            Field::IssRetido => "issRetido",
            Field::Aliquota => "aliquota",
            Field::DescontoIncondicionado => "descontoIncondicionado",
            Field::DescontoCondicionado => "descontoCondicionado",
            Field::BaseCalculo => "baseCalculo",
            Field::ValorLiquidoNfse => "valorLiquidoNfse",
            Field::ItemListaServico => "itemListaServico",
            Field::CodigoCnae => "codigoCnae",
            Field::CodigoTributacaoMunicipio => "codigoTributacaoMunicipio",
            Field::DescricaoCodigoTributacaoMunicipio => "descricaoCodigoTributacaoMunicipio",
            Field::Discriminacao => "discriminacao",
            Field::PrestadorRazaoSocial => "prestadorRazaoSocial",
            Field::PrestadorCnpj => "prestadorCnpj",
            Field::TomadorRazaoSocial => "tomadorRazaoSocial",
            Field::TomadorCpfCnpj => "tomadorCpfCnpj",
            Field::CodigoMunicipio => "codigoMunicipio",
            Field::Uf => "uf",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::IssRetido => FieldKind::Withholding,
            Field::ValorServicos
            | Field::ValorDeducoes
            | Field::ValorPis
            | Field::ValorCofins
            | Field::ValorInss
            | Field::ValorIr
            | Field::ValorCsll
            | Field::ValTotTributos
            | Field::VBcPisCofins
            | Field::VBcIbsCbs
            | Field::OutrasRetencoes
            | Field::ValorIss
            | Field::Aliquota
            | Field::DescontoIncondicionado
            | Field::DescontoCondicionado
            | Field::BaseCalculo
            | Field::ValorLiquidoNfse => FieldKind::Amount,
            _ => FieldKind::Text,
        }
    }

    /// Normalize `raw` and store it in `record`.
    pub fn apply(self, record: &mut InvoiceRecord, raw: &str, sanitize: bool) {
        match self.kind() {
            FieldKind::Amount => {
                if let Some(slot) = self.amount_slot(record) {
                    *slot = normalize_number(raw);
                }
            }
            FieldKind::Text => {
                if let Some(slot) = self.text_slot(record) {
                    *slot = if sanitize {
                        sanitize_text(raw)
                    } else {
                        raw.trim().to_string()
                    };
                }
            }
            FieldKind::Withholding => record.iss_retido = parse_iss_withholding(raw),
        }
    }

    fn amount_slot(self, record: &mut InvoiceRecord) -> Option<&mut Decimal> {
        let slot = match self {
            Field::ValorServicos => &mut record.valor_servicos,
            Field::ValorDeducoes => &mut record.valor_deducoes,
            Field::ValorPis => &mut record.valor_pis,
            Field::ValorCofins => &mut record.valor_cofins,
            Field::ValorInss => &mut record.valor_inss,
            Field::ValorIr => &mut record.valor_ir,
            Field::ValorCsll => &mut record.valor_csll,
            Field::ValTotTributos => &mut record.val_tot_tributos,
            Field::VBcPisCofins => &mut record.v_bc_pis_cofins,
            Field::VBcIbsCbs => &mut record.v_bc_ibs_cbs,
            Field::OutrasRetencoes => &mut record.outras_retencoes,
            Field::ValorIss => &mut record.valor_iss,
            Field::Aliquota => &mut record.aliquota,
            Field::DescontoIncondicionado => &mut record.desconto_incondicionado,
            Field::DescontoCondicionado => &mut record.desconto_condicionado,
            Field::BaseCalculo => &mut record.base_calculo,
            Field::ValorLiquidoNfse => &mut record.valor_liquido_nfse,
            _ => return None,
        };
        Some(slot)
    }

    fn text_slot(self, record: &mut InvoiceRecord) -> Option<&mut String> {
        let slot = match self {
            Field::Numero => &mut record.numero,
            Field::CodigoVerificacao => &mut record.codigo_verificacao,
            Field::DataEmissao => &mut record.data_emissao,
            Field::ItemListaServico => &mut record.item_lista_servico,
            Field::CodigoCnae => &mut record.codigo_cnae,
            Field::CodigoTributacaoMunicipio => &mut record.codigo_tributacao_municipio,
            Field::DescricaoCodigoTributacaoMunicipio => {
                &mut record.descricao_codigo_tributacao_municipio
            }
            Field::Discriminacao => &mut record.discriminacao,
            Field::PrestadorRazaoSocial => &mut record.prestador_razao_social,
            Field::PrestadorCnpj => &mut record.prestador_cnpj,
            Field::TomadorRazaoSocial => &mut record.tomador_razao_social,
            Field::TomadorCpfCnpj => &mut record.tomador_cpf_cnpj,
            Field::CodigoMunicipio => &mut record.codigo_municipio,
            Field::Uf => &mut record.uf,
            _ => return None,
        };
        Some(slot)
    }
}

/// One place a field may be found: `tag` somewhere below `anchor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<A> {
    pub anchor: A,
    pub tag: &'static str,
}

/// Shorthand for table literals.
pub const fn at<A>(anchor: A, tag: &'static str) -> Candidate<A> {
    Candidate { anchor, tag }
}

/// A field and the places to look for it, most specific first.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule<A: 'static> {
    pub field: Field,
    pub candidates: &'static [Candidate<A>],
}

/// Raw (un-normalized) text resolved for one invoice node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    values: HashMap<Field, String>,
    notes: Vec<String>,
}

impl RawFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.values.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Record something the caller should surface as an extraction warning.
    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}

/// Return the text of the first candidate that yields something non-empty.
///
/// Candidates whose anchor is absent in this document are skipped.
pub fn resolve<'a, 'input, A, F>(candidates: &[Candidate<A>], anchor_node: F) -> Option<String>
where
    A: Copy,
    'input: 'a,
    F: Fn(A) -> Option<Node<'a, 'input>>,
{
    candidates
        .iter()
        .find_map(|c| anchor_node(c.anchor).and_then(|node| element_text(node, c.tag)))
}

/// Resolve every rule of a dialect table.
pub fn resolve_table<'a, 'input, A, F>(table: &[FieldRule<A>], anchor_node: F) -> RawFields
where
    A: Copy,
    'input: 'a,
    F: Fn(A) -> Option<Node<'a, 'input>>,
{
    let mut raw = RawFields::new();
    for rule in table {
        if let Some(value) = resolve(rule.candidates, &anchor_node) {
            raw.insert(rule.field, value);
        }
    }
    raw
}
