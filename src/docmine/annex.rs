//! Annex-page handling: locate the "Anexo II" page inside a case PDF,
//! extract its text (falling back to OCR when the page is a scan) and run
//! the label-driven scan that pairs each party type with a name and a
//! CPF/CNPJ.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use lopdf::Document;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use super::patterns::first_document;

/// Native extractions shorter than this are treated as scanned pages.
const MIN_EXTRACTED_CHARS: usize = 100;

/// Party-type labels searched for on the annex page. These are the same
/// labels the results spreadsheet grows dynamic columns for.
pub const PARTY_TYPES: [&str; 9] = [
    "requerente",
    "invitante",
    "interessado",
    "cedente",
    "sucessora",
    "favorecido",
    "sucessor",
    "cessionário",
    "favorecida",
];

/// Field words that disqualify a line from being a party name.
const NAME_STOPWORDS: [&str; 4] = ["cpf", "cnpj", "data", "valor"];
const NEXT_LINE_STOPWORDS: [&str; 7] = [
    "cpf",
    "cnpj",
    "data",
    "valor",
    "contribuições",
    "anexo",
    "nascimento",
];

lazy_static! {
    /// Leading enumerators like "1. " or "2) " before a name.
    static ref ENUMERATOR: Regex = Regex::new(r"^\d+[.)]\s*").unwrap();
    static ref DIGITS_ONLY: Regex = Regex::new(r"^\d+$").unwrap();
    static ref DIGITS_PUNCT_ONLY: Regex = Regex::new(r"^\d+[.\s/-]*$").unwrap();
}

#[derive(Debug, Clone)]
pub struct AnnexPage {
    /// 1-based page number, as pdftoppm expects it.
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub dpi: u32,
    pub lang: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            lang: "por".to_string(),
        }
    }
}

/// Name and document found for one party type on the annex page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartyIdentity {
    pub nome: String,
    pub cpf_cnpj: String,
}

/// Scans the PDF pages in order and returns the first one whose extracted
/// text mentions "Anexo II" (case-insensitive). `None` when no page does.
pub fn locate_annex_page(pdf_path: &Path) -> Result<Option<AnnexPage>> {
    let doc = Document::load(pdf_path)
        .with_context(|| format!("Não foi possível ler o PDF {}", pdf_path.display()))?;

    for (&page_number, _) in doc.get_pages().iter() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(err) => {
                debug!("Falha ao extrair texto da página {}: {}", page_number, err);
                continue;
            }
        };
        if text.to_lowercase().contains("anexo ii") {
            return Ok(Some(AnnexPage { page_number, text }));
        }
    }

    Ok(None)
}

/// Annex page text ready for matching: the native extraction, replaced by
/// OCR output when the extraction is too short to be useful. OCR failures
/// are logged and swallowed so mining continues with whatever text exists.
pub async fn annex_text(pdf_path: &Path, ocr: &OcrSettings) -> Result<Option<AnnexPage>> {
    let Some(mut page) = locate_annex_page(pdf_path)? else {
        return Ok(None);
    };

    if page.text.chars().count() < MIN_EXTRACTED_CHARS {
        debug!(
            "Texto nativo da página {} muito curto ({} caracteres), tentando OCR",
            page.page_number,
            page.text.chars().count()
        );
        match ocr_page(pdf_path, page.page_number, ocr).await {
            Ok(ocr_text) if !ocr_text.trim().is_empty() => page.text = ocr_text,
            Ok(_) => debug!("OCR não produziu texto para a página {}", page.page_number),
            Err(err) => warn!("Erro no OCR da página {}: {:#}", page.page_number, err),
        }
    }

    Ok(Some(page))
}

/// Rasterizes one page with pdftoppm and pipes the image through
/// tesseract. Both tools come from the system; their absence is an error
/// the caller downgrades to a warning.
pub async fn ocr_page(pdf_path: &Path, page_number: u32, settings: &OcrSettings) -> Result<String> {
    let base = std::env::temp_dir().join(format!(
        "processo-ocr-{}-{}",
        std::process::id(),
        page_number
    ));
    let dpi = settings.dpi.to_string();
    let page = page_number.to_string();

    let status = Command::new("pdftoppm")
        .args(["-r", dpi.as_str(), "-png"])
        .args(["-f", page.as_str(), "-l", page.as_str()])
        .arg(pdf_path)
        .arg(&base)
        .status()
        .await
        .context("Falha ao executar pdftoppm (poppler-utils instalado?)")?;
    if !status.success() {
        bail!("pdftoppm terminou com erro para a página {page_number}");
    }

    let png = rendered_png(&base, page_number)?;

    let output = Command::new("tesseract")
        .arg(&png)
        .arg("stdout")
        .args(["-l", settings.lang.as_str()])
        .output()
        .await
        .context("Falha ao executar tesseract (instalado?)")?;
    let _ = std::fs::remove_file(&png);

    if !output.status.success() {
        bail!(
            "tesseract terminou com erro: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// pdftoppm zero-pads the page suffix depending on the document size, so
/// the rendered file is found by prefix instead of an exact name.
fn rendered_png(base: &Path, page_number: u32) -> Result<PathBuf> {
    let dir = base.parent().unwrap_or_else(|| Path::new("."));
    let prefix = base
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();

    for entry in std::fs::read_dir(dir)?.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) && name.ends_with(".png") {
                return Ok(entry.path());
            }
        }
    }
    bail!("pdftoppm não gerou imagem para a página {page_number}")
}

/// Label-driven scan of the annex text: for each known party type, the
/// first line matching one of its label forms yields a name (same line
/// after the colon, else the next non-field line) and the nearest
/// CPF/CNPJ (within the following lines). Types with neither are skipped.
pub fn scan_annex_parties(text: &str) -> Vec<(String, PartyIdentity)> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut found = Vec::new();

    for tipo in PARTY_TYPES {
        let labels = label_patterns(tipo);
        for (i, line) in lines.iter().enumerate() {
            let line_lower = line.to_lowercase();
            if !labels.iter().any(|label| line_lower.contains(label)) {
                continue;
            }

            let nome = extract_name(&lines, i);
            let cpf_cnpj = document_following(&lines, i);

            if !nome.is_empty() || cpf_cnpj.is_some() {
                found.push((
                    tipo.to_string(),
                    PartyIdentity {
                        nome,
                        cpf_cnpj: cpf_cnpj.unwrap_or_default(),
                    },
                ));
                break;
            }
        }
    }

    found
}

fn label_patterns(tipo: &str) -> Vec<String> {
    let mut labels = vec![
        format!("{tipo}:"),
        format!("{tipo} n°"),
        format!("{tipo} n."),
    ];
    match tipo {
        "interessado" => labels.push("interessada:".to_string()),
        "favorecido" => labels.push("favorecida:".to_string()),
        _ => {}
    }
    labels
}

fn extract_name(lines: &[&str], label_idx: usize) -> String {
    let line = lines[label_idx];
    let mut nome = String::new();

    if let Some(colon) = line.find(':') {
        let candidate = ENUMERATOR
            .replace(line[colon + 1..].trim(), "")
            .trim()
            .to_string();
        let lower = candidate.to_lowercase();
        if candidate.chars().count() > 3
            && !DIGITS_ONLY.is_match(&candidate)
            && !NAME_STOPWORDS.iter().any(|word| lower.contains(word))
        {
            nome = candidate;
        }
    }

    if nome.chars().count() < 3 {
        let end = (label_idx + 6).min(lines.len());
        for next_line in &lines[label_idx + 1..end] {
            let candidate = ENUMERATOR.replace(next_line.trim(), "").trim().to_string();
            if candidate.chars().count() <= 3 {
                continue;
            }
            let lower = candidate.to_lowercase();
            if NEXT_LINE_STOPWORDS.iter().any(|word| lower.contains(word)) {
                continue;
            }
            if DIGITS_PUNCT_ONLY.is_match(&candidate) {
                continue;
            }
            nome = candidate;
            break;
        }
    }

    nome
}

fn document_following(lines: &[&str], label_idx: usize) -> Option<String> {
    let end = (label_idx + 6).min(lines.len());
    lines[label_idx..end]
        .iter()
        .find_map(|line| first_document(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_labeled_parties_with_documents() {
        let text = "ANEXO II\n\
                    Requerente: Maurício Ferreira Leite\n\
                    CPF: 123.456.789-00\n\
                    Interessada: Empresa Beta Ltda\n\
                    CNPJ: 12.345.678/0001-90";
        let parties = scan_annex_parties(text);

        let requerente = parties
            .iter()
            .find(|(tipo, _)| tipo == "requerente")
            .map(|(_, id)| id)
            .expect("requerente should be found");
        assert_eq!(requerente.nome, "Maurício Ferreira Leite");
        assert_eq!(requerente.cpf_cnpj, "123.456.789-00");

        let interessado = parties
            .iter()
            .find(|(tipo, _)| tipo == "interessado")
            .map(|(_, id)| id)
            .expect("interessada label should map to interessado");
        assert_eq!(interessado.nome, "Empresa Beta Ltda");
        assert_eq!(interessado.cpf_cnpj, "12.345.678/0001-90");
    }

    #[test]
    fn strips_enumerator_from_names() {
        let text = "Cedente: 1. Fulano de Tal\n123.456.789-00";
        let parties = scan_annex_parties(text);
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].1.nome, "Fulano de Tal");
    }

    #[test]
    fn name_from_following_line_when_label_is_bare() {
        let lines = vec!["Favorecido:", "2) Beltrano Souza", "CPF 987.654.321-00"];
        assert_eq!(extract_name(&lines, 0), "Beltrano Souza");
    }

    #[test]
    fn skips_field_lines_when_looking_for_names() {
        let lines = vec!["Interessado:", "Data de nascimento: 01/01/1980", "Ciclano Pereira"];
        assert_eq!(extract_name(&lines, 0), "Ciclano Pereira");
    }

    #[test]
    fn empty_text_yields_no_parties() {
        assert!(scan_annex_parties("").is_empty());
    }
}
