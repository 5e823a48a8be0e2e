//! Rendering extracted records as JSON, CSV, text and the summary sheet.

use std::collections::HashSet;
use std::path::Path;

use chrono::Local;
use rust_decimal::Decimal;
use tracing::warn;

use nfse_core::{InvoiceRecord, RecordTotals};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per invoice
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn format_records(records: &[InvoiceRecord], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Csv => format_csv(records),
        OutputFormat::Text => Ok(format_text(records)),
    }
}

fn format_csv(records: &[InvoiceRecord]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    for record in records {
        wtr.serialize(record)?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(records: &[InvoiceRecord]) -> String {
    let mut output = String::new();

    for record in records {
        output.push_str(&format!("NFS-e {}", record.numero));
        if !record.data_emissao.is_empty() {
            output.push_str(&format!(" ({})", record.data_emissao));
        }
        output.push('\n');

        output.push_str(&format!(
            "  Prestador: {} [{}]\n",
            record.prestador_razao_social, record.prestador_cnpj
        ));
        output.push_str(&format!(
            "  Tomador:   {} [{}]\n",
            record.tomador_razao_social, record.tomador_cpf_cnpj
        ));
        if !record.discriminacao.is_empty() {
            output.push_str(&format!("  Servico:   {}\n", record.discriminacao));
        }
        output.push_str(&format!("  Valor:     {}\n", money(record.valor_servicos)));
        output.push_str(&format!(
            "  ISS:       {} ({}%){}\n",
            money(record.valor_iss),
            record.aliquota,
            if record.is_iss_withheld() { " retido" } else { "" }
        ));
        output.push_str(&format!("  Liquido:   {}\n", money(record.valor_liquido_nfse)));
        output.push('\n');
    }

    let totals = RecordTotals::from_records(records);
    output.push_str(&format!(
        "{} invoice(s), generated {}\n",
        totals.count,
        Local::now().format("%Y-%m-%d %H:%M")
    ));
    output.push_str(&format!("  Total servicos: {}\n", money(totals.valor_servicos)));
    output.push_str(&format!("  Total liquido:  {}\n", money(totals.valor_liquido_nfse)));
    output.push_str(&format!("  Total ISS:      {}\n", money(totals.valor_iss)));
    if totals.saturated {
        output.push_str("  (totals capped at the decimal range)\n");
    }

    output
}

fn money(value: Decimal) -> String {
    format!("R$ {:.2}", value)
}

/// Drop records whose (number, provider) pair was already seen. First one wins.
pub fn dedup_records(records: Vec<InvoiceRecord>) -> (Vec<InvoiceRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::new();

    let kept: Vec<InvoiceRecord> = records
        .into_iter()
        .filter(|r| {
            let (numero, cnpj) = r.dedup_key();
            seen.insert((numero.to_string(), cnpj.to_string()))
        })
        .collect();

    let removed = before - kept.len();
    (kept, removed)
}

const SUMMARY_HEADER: [&str; 20] = [
    "Numero",
    "Data Emissao",
    "Item Lista Servico",
    "Cod. Trib. Municipio",
    "Descricao Servico",
    "Valor Servicos",
    "Valor Liquido",
    "ISS",
    "ISS Retido",
    "Aliquota",
    "PIS",
    "COFINS",
    "CSLL",
    "IR",
    "INSS",
    "Total Tributos",
    "BC PIS/COFINS",
    "BC IBS/CBS",
    "Tomador",
    "CNPJ/CPF Tomador",
];

/// Write the spreadsheet-style summary with a closing totals row.
pub fn write_summary(path: &Path, records: &[InvoiceRecord]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(SUMMARY_HEADER)?;

    for r in records {
        wtr.write_record([
            r.numero.clone(),
            r.data_emissao.clone(),
            r.item_lista_servico.clone(),
            r.codigo_tributacao_municipio.clone(),
            r.discriminacao.clone(),
            r.valor_servicos.to_string(),
            r.valor_liquido_nfse.to_string(),
            r.valor_iss.to_string(),
            if r.is_iss_withheld() { "Sim" } else { "Nao" }.to_string(),
            r.aliquota.to_string(),
            r.valor_pis.to_string(),
            r.valor_cofins.to_string(),
            r.valor_csll.to_string(),
            r.valor_ir.to_string(),
            r.valor_inss.to_string(),
            r.val_tot_tributos.to_string(),
            r.v_bc_pis_cofins.to_string(),
            r.v_bc_ibs_cbs.to_string(),
            r.tomador_razao_social.clone(),
            r.tomador_cpf_cnpj.clone(),
        ])?;
    }

    let t = RecordTotals::from_records(records);
    if t.saturated {
        warn!("{}: totals exceeded the decimal range and were capped", path.display());
    }
    wtr.write_record([
        "TOTAL GERAL".to_string(),
        format!("{} notas", t.count),
        String::new(),
        String::new(),
        String::new(),
        t.valor_servicos.to_string(),
        t.valor_liquido_nfse.to_string(),
        t.valor_iss.to_string(),
        String::new(),
        String::new(),
        t.valor_pis.to_string(),
        t.valor_cofins.to_string(),
        t.valor_csll.to_string(),
        t.valor_ir.to_string(),
        t.valor_inss.to_string(),
        t.val_tot_tributos.to_string(),
        t.v_bc_pis_cofins.to_string(),
        t.v_bc_ibs_cbs.to_string(),
        String::new(),
        String::new(),
    ])?;

    wtr.flush()?;
    Ok(())
}
