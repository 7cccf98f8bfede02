//! Document miner: walks an existing results spreadsheet, pairs each row
//! with its downloaded PDF, and fills the per-party CPF/CNPJ columns from
//! the annex page.

pub mod annex;
pub mod patterns;
pub mod proximity;

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};

use crate::report::{CellValue, Sheet};
use annex::{OcrSettings, PARTY_TYPES};

const NOT_FOUND: &str = "CPF/CNPJ não encontrado";
const PDF_NOT_FOUND: &str = "PDF não encontrado";

pub struct MinerConfig {
    pub results_path: PathBuf,
    pub pdf_dir: PathBuf,
    pub ocr: OcrSettings,
}

/// Column pair for one party type in the results sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartyColumns {
    pub nome: usize,
    pub cpf_cnpj: usize,
}

/// Finds the name column of each known party type (case-insensitive
/// substring, skipping headers that already denote a CPF/CNPJ column) and
/// guarantees the adjacent "<Tipo> CPF/CNPJ" column, inserting it when
/// missing. Idempotent across repeated runs.
pub fn map_party_columns(sheet: &mut Sheet) -> Vec<(String, PartyColumns)> {
    let mut mapped = Vec::new();

    for tipo in PARTY_TYPES {
        let nome_col = sheet.headers.iter().position(|header| {
            let lower = header.to_lowercase();
            lower.contains(tipo) && !lower.contains("cpf") && !lower.contains("cnpj")
        });
        let Some(nome_col) = nome_col else {
            continue;
        };

        let cpf_col = sheet.headers.iter().position(|header| {
            let lower = header.to_lowercase();
            lower.contains(tipo) && (lower.contains("cpf") || lower.contains("cnpj"))
        });
        let cpf_cnpj = match cpf_col {
            Some(idx) => idx,
            None => {
                let header = format!("{} CPF/CNPJ", capitalize(tipo));
                let anchor = sheet.headers[nome_col].clone();
                sheet.ensure_column(&header, Some(anchor.as_str()))
            }
        };

        mapped.push((
            tipo.to_string(),
            PartyColumns {
                nome: nome_col,
                cpf_cnpj,
            },
        ));
    }

    mapped
}

/// Mines every row of the results spreadsheet, persisting after each one.
/// Rows without a matching PDF get the "PDF não encontrado" sentinel; a
/// missing annex page or identifier never aborts the pass.
pub async fn mine_results(config: &MinerConfig) -> Result<()> {
    let mut sheet = Sheet::load(&config.results_path)?;
    let columns = map_party_columns(&mut sheet);

    if columns.is_empty() {
        warn!(
            "Nenhuma coluna de parte encontrada na planilha (procurado: {})",
            PARTY_TYPES.join(", ")
        );
        return Ok(());
    }

    let case_col = 0;
    let total = sheet.rows.len();

    for row_idx in 0..total {
        let numero = sheet.cell_text(row_idx, case_col).trim().to_string();
        let pdf_path = config.pdf_dir.join(format!("{numero}.pdf"));

        if pdf_path.exists() {
            info!("[{}/{}] Processo {}: processando...", row_idx + 1, total, numero);
            let requerente = columns
                .iter()
                .find(|(tipo, _)| tipo == "requerente")
                .map(|(_, cols)| sheet.cell_text(row_idx, cols.nome));
            match mine_case_pdf(&pdf_path, requerente.as_deref(), &columns, &config.ocr).await {
                Ok(updates) => {
                    for (col, value) in updates {
                        sheet.set_cell(row_idx, col, CellValue::text(value));
                    }
                }
                Err(err) => {
                    warn!("Processo {}: falha ao minerar PDF: {:#}", numero, err);
                }
            }
        } else {
            for (_, cols) in &columns {
                sheet.set_cell(row_idx, cols.cpf_cnpj, CellValue::text(PDF_NOT_FOUND));
            }
            info!("✗ Processo {}: PDF não encontrado", numero);
        }

        sheet.save(&config.results_path)?;
    }

    info!("Mineração concluída: {} linha(s) processada(s)", total);
    Ok(())
}

/// Updates for one row: the label-driven annex scan first; when it finds
/// nothing, the name-proximity search keyed by the requerente column is
/// the compatibility fallback.
async fn mine_case_pdf(
    pdf_path: &Path,
    requerente: Option<&str>,
    columns: &[(String, PartyColumns)],
    ocr: &OcrSettings,
) -> Result<Vec<(usize, String)>> {
    let Some(page) = annex::annex_text(pdf_path, ocr).await? else {
        info!("Página 'Anexo II' não encontrada em {}", pdf_path.display());
        return Ok(Vec::new());
    };

    let mut updates = Vec::new();
    let scanned = annex::scan_annex_parties(&page.text);

    for (tipo, identity) in &scanned {
        let Some((_, cols)) = columns.iter().find(|(t, _)| t == tipo) else {
            continue;
        };
        if identity.cpf_cnpj.is_empty() {
            updates.push((cols.cpf_cnpj, NOT_FOUND.to_string()));
            info!("! {}: CPF/CNPJ não encontrado", capitalize(tipo));
        } else {
            updates.push((cols.cpf_cnpj, identity.cpf_cnpj.clone()));
            info!("✓ {}: CPF/CNPJ encontrado {}", capitalize(tipo), identity.cpf_cnpj);
        }
    }

    if scanned.is_empty() {
        if let Some((_, cols)) = columns.iter().find(|(tipo, _)| tipo == "requerente") {
            let target = requerente.map(str::trim).filter(|name| !name.is_empty());
            if let Some(document) = proximity::document_near_name(&page.text, target) {
                info!("✓ Requerente: CPF/CNPJ encontrado {}", document);
                updates.push((cols.cpf_cnpj, document));
            }
        }
    }

    Ok(updates)
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(sheet: &Sheet) -> Vec<&str> {
        sheet.headers.iter().map(String::as_str).collect()
    }

    #[test]
    fn inserts_cpf_column_next_to_party_column() {
        let mut sheet = Sheet::new(&["numero_processo", "Requerente", "Devedor"]);
        let mapped = map_party_columns(&mut sheet);

        assert_eq!(
            headers(&sheet),
            vec![
                "numero_processo",
                "Requerente",
                "Requerente CPF/CNPJ",
                "Devedor"
            ]
        );
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].0, "requerente");
        assert_eq!(mapped[0].1, PartyColumns { nome: 1, cpf_cnpj: 2 });
    }

    #[test]
    fn mapping_is_idempotent() {
        let mut sheet = Sheet::new(&["numero_processo", "Requerente"]);
        map_party_columns(&mut sheet);
        let before = sheet.headers.clone();
        map_party_columns(&mut sheet);
        assert_eq!(sheet.headers, before);
    }

    #[test]
    fn skips_existing_cpf_columns_as_name_columns() {
        let mut sheet = Sheet::new(&[
            "numero_processo",
            "Invitante",
            "Invitante CPF/CNPJ",
        ]);
        let mapped = map_party_columns(&mut sheet);
        assert_eq!(sheet.headers.len(), 3);
        assert_eq!(mapped[0].1, PartyColumns { nome: 1, cpf_cnpj: 2 });
    }

    #[test]
    fn capitalizes_party_labels() {
        assert_eq!(capitalize("requerente"), "Requerente");
        assert_eq!(capitalize(""), "");
    }
}
