//! Result-spreadsheet handling: the canonical column layout, the sheet
//! abstraction persisted after every row, and the assembly of one output
//! row per case (including the full error-sentinel row).
//!
//! The workbook is read with calamine and rewritten whole with
//! rust_xlsxwriter on every persist; formulas are loaded back as formulas
//! so the PDF link cells survive round-trips.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Formula, Workbook};
use tracing::info;

/// Column layout of the results spreadsheet, in output order.
pub const CANONICAL_HEADERS: [&str; 22] = [
    "numero_processo",
    "Status",
    "Classe",
    "Assunto",
    "Foro",
    "Vara",
    "Juiz",
    "Distribuicao",
    "Controle",
    "Area",
    "ValorAcao",
    "Outros numeros",
    "Requerente",
    "ADVOGADOS REQUERENTE",
    "Devedor",
    "ADVOGADOS DEVEDOR",
    "Movimentacoes",
    "Petições diversas",
    "Incidentes, acoes incidentais, recursos e execucoes de sentencas",
    "Apensos, Entranhados e Unificados",
    "Audiencias",
    "PDF",
];

/// New party-type columns are inserted right after this column so the
/// party block stays together.
pub const DYNAMIC_COLUMN_ANCHOR: &str = "ADVOGADOS DEVEDOR";

const ERRO: &str = "Erro";
const ERRO_NAO_ENCONTRADO: &str = "Erro ou não encontrado";
const NAO_BAIXADO: &str = "Não baixado";

/// A single spreadsheet cell. Formula bodies are stored without the
/// leading `=`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Formula(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 => format!("{:.0}", n),
            CellValue::Number(n) => n.to_string(),
            CellValue::Formula(f) => format!("={}", f),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// In-memory view of the single worksheet everything here operates on:
/// an ordered header row plus data rows of typed cells.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Loads the first worksheet of an existing workbook. Cell values come
    /// from the cached-value range; the formula range is overlaid so
    /// formula cells keep their formula text instead of the cached result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut workbook: Xlsx<_> = open_workbook(path).with_context(|| {
            format!(
                "Não foi possível abrir a planilha {} (arquivo aberto em outro programa?)",
                path.display()
            )
        })?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("Planilha sem abas: {}", path.display()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .with_context(|| format!("Não foi possível ler a aba '{}'", sheet_name))?;

        let mut formulas: HashMap<(u32, u32), String> = HashMap::new();
        if let Ok(formula_range) = workbook.worksheet_formula(&sheet_name) {
            if let Some(start) = formula_range.start() {
                for (r, row) in formula_range.rows().enumerate() {
                    for (c, formula) in row.iter().enumerate() {
                        if !formula.is_empty() {
                            formulas.insert(
                                (start.0 + r as u32, start.1 + c as u32),
                                formula.trim_start_matches('=').to_string(),
                            );
                        }
                    }
                }
            }
        }

        let start = range.start().unwrap_or((0, 0));
        let mut rows_iter = range.rows();
        let headers: Vec<String> = rows_iter
            .next()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
            .unwrap_or_default();

        let mut rows = Vec::new();
        for (i, row) in rows_iter.enumerate() {
            let abs_row = start.0 + 1 + i as u32;
            let mut cells = Vec::with_capacity(row.len());
            for (j, cell) in row.iter().enumerate() {
                let abs_col = start.1 + j as u32;
                let value = if let Some(formula) = formulas.get(&(abs_row, abs_col)) {
                    CellValue::Formula(formula.clone())
                } else {
                    match cell {
                        Data::Empty => CellValue::Empty,
                        Data::String(s) => CellValue::Text(s.clone()),
                        Data::Float(f) => CellValue::Number(*f),
                        Data::Int(i) => CellValue::Number(*i as f64),
                        other => CellValue::Text(other.to_string()),
                    }
                };
                cells.push(value);
            }
            rows.push(cells);
        }

        Ok(Self { headers, rows })
    }

    /// Rewrites the whole workbook: bold header row, then every data row.
    /// A locked or unwritable file is fatal for the run.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        let bold = Format::new().set_bold();

        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &bold)?;
        }

        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let row_idx = (r + 1) as u32;
                let col_idx = c as u16;
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(s) => {
                        worksheet.write_string(row_idx, col_idx, s)?;
                    }
                    CellValue::Number(n) => {
                        worksheet.write_number(row_idx, col_idx, *n)?;
                    }
                    CellValue::Formula(f) => {
                        worksheet.write_formula(row_idx, col_idx, Formula::new(f))?;
                    }
                }
            }
        }

        workbook.save(path).with_context(|| {
            format!(
                "Não foi possível salvar a planilha {} (feche o arquivo e tente novamente)",
                path.display()
            )
        })?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Schema-migration step: adds `name` to the header when absent. With
    /// `after` naming an existing column the new one lands immediately to
    /// its right; otherwise (or when the anchor is missing) it is appended
    /// at the end. Idempotent; existing rows are padded with empty cells.
    /// Returns the column index of `name`.
    pub fn ensure_column(&mut self, name: &str, after: Option<&str>) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }

        let insert_at = match after.and_then(|anchor| self.column_index(anchor)) {
            Some(anchor_idx) => anchor_idx + 1,
            None => self.headers.len(),
        };

        self.headers.insert(insert_at, name.to_string());
        for row in &mut self.rows {
            if row.len() < insert_at {
                row.resize(insert_at, CellValue::Empty);
            }
            row.insert(insert_at, CellValue::Empty);
        }
        insert_at
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: CellValue) {
        if row >= self.rows.len() {
            self.rows.resize(row + 1, Vec::new());
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value;
    }

    pub fn cell_text(&self, row: usize, col: usize) -> String {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(|cell| cell.as_text())
            .unwrap_or_default()
    }
}

/// Everything extracted for one case, already shaped for the output row.
#[derive(Debug, Clone, Default)]
pub struct CaseRecord {
    pub numero_processo: String,
    pub status: String,
    pub classe: String,
    pub assunto: String,
    pub foro: String,
    pub vara: String,
    pub juiz: String,
    pub distribuicao: String,
    pub controle: String,
    pub area: String,
    pub valor_acao: String,
    pub outros_numeros: String,
    pub requerentes: Vec<String>,
    pub advogados_requerentes: Vec<String>,
    pub devedores: Vec<String>,
    pub advogados_devedores: Vec<String>,
    /// Extra participation types as (label, name, attorney) triples.
    pub outras_partes: Vec<(String, String, String)>,
    pub movimentacoes: String,
    pub peticoes: String,
    pub incidentes: String,
    pub apensos: String,
    pub audiencias: String,
    pub caminho_pdf: Option<PathBuf>,
}

impl CaseRecord {
    pub fn ok(numero_processo: &str) -> Self {
        Self {
            numero_processo: numero_processo.to_string(),
            status: "OK".to_string(),
            ..Default::default()
        }
    }

    /// Full sentinel row for an unrecoverable per-case failure; the error
    /// summary rides in the movements column so it lands in the output.
    pub fn error(numero_processo: &str, mensagem: &str) -> Self {
        Self {
            numero_processo: numero_processo.to_string(),
            status: "ERRO".to_string(),
            classe: ERRO_NAO_ENCONTRADO.to_string(),
            assunto: ERRO_NAO_ENCONTRADO.to_string(),
            foro: ERRO.to_string(),
            vara: ERRO.to_string(),
            juiz: ERRO.to_string(),
            distribuicao: ERRO.to_string(),
            controle: ERRO.to_string(),
            area: ERRO.to_string(),
            valor_acao: ERRO.to_string(),
            outros_numeros: ERRO.to_string(),
            movimentacoes: mensagem.to_string(),
            peticoes: ERRO.to_string(),
            incidentes: ERRO.to_string(),
            apensos: ERRO.to_string(),
            audiencias: ERRO.to_string(),
            caminho_pdf: None,
            ..Default::default()
        }
    }

    fn pdf_cell(&self) -> CellValue {
        match &self.caminho_pdf {
            Some(path) => {
                let shown = path.display().to_string();
                CellValue::Formula(format!("HYPERLINK(\"{shown}\", \"{shown}\")"))
            }
            None => CellValue::text(NAO_BAIXADO),
        }
    }
}

/// Incremental writer over the results workbook: opens (or creates) the
/// file, evolves the header for dynamic party types and persists after
/// every appended row, so a crash loses at most the case in flight.
pub struct ReportWriter {
    path: PathBuf,
    sheet: Sheet,
}

impl ReportWriter {
    pub fn open(path: &Path) -> Result<Self> {
        let existed = path.exists();
        let mut sheet = if existed {
            Sheet::load(path)?
        } else {
            Sheet::new(&CANONICAL_HEADERS)
        };

        for header in CANONICAL_HEADERS {
            sheet.ensure_column(header, None);
        }

        let writer = Self {
            path: path.to_path_buf(),
            sheet,
        };
        if !existed {
            writer.sheet.save(&writer.path)?;
            info!("Planilha de resultados criada: {}", path.display());
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> usize {
        self.sheet.rows.len()
    }

    /// Appends one row for the record (duplicates allowed, no upsert) and
    /// persists the workbook. Dynamic party-type columns discovered on the
    /// record are migrated into the header first.
    pub fn append_case(&mut self, record: &CaseRecord) -> Result<()> {
        let mut anchor = DYNAMIC_COLUMN_ANCHOR.to_string();
        for (tipo, _, _) in &record.outras_partes {
            let advogados = format!("ADVOGADOS {}", tipo.to_uppercase());
            self.sheet.ensure_column(tipo, Some(anchor.as_str()));
            self.sheet.ensure_column(&advogados, Some(tipo.as_str()));
            anchor = advogados;
        }

        let mut row = vec![CellValue::Empty; self.sheet.headers.len()];
        let set = |sheet: &Sheet, row: &mut Vec<CellValue>, name: &str, value: CellValue| {
            if let Some(idx) = sheet.column_index(name) {
                row[idx] = value;
            }
        };

        let text_cells = [
            ("numero_processo", record.numero_processo.as_str()),
            ("Status", record.status.as_str()),
            ("Classe", record.classe.as_str()),
            ("Assunto", record.assunto.as_str()),
            ("Foro", record.foro.as_str()),
            ("Vara", record.vara.as_str()),
            ("Juiz", record.juiz.as_str()),
            ("Distribuicao", record.distribuicao.as_str()),
            ("Controle", record.controle.as_str()),
            ("Area", record.area.as_str()),
            ("ValorAcao", record.valor_acao.as_str()),
            ("Outros numeros", record.outros_numeros.as_str()),
            ("Movimentacoes", record.movimentacoes.as_str()),
            ("Petições diversas", record.peticoes.as_str()),
            (
                "Incidentes, acoes incidentais, recursos e execucoes de sentencas",
                record.incidentes.as_str(),
            ),
            (
                "Apensos, Entranhados e Unificados",
                record.apensos.as_str(),
            ),
            ("Audiencias", record.audiencias.as_str()),
        ];
        for (name, value) in text_cells {
            set(&self.sheet, &mut row, name, CellValue::text(value));
        }

        set(
            &self.sheet,
            &mut row,
            "Requerente",
            CellValue::text(record.requerentes.join(", ")),
        );
        set(
            &self.sheet,
            &mut row,
            "ADVOGADOS REQUERENTE",
            CellValue::text(record.advogados_requerentes.join(", ")),
        );
        set(
            &self.sheet,
            &mut row,
            "Devedor",
            CellValue::text(record.devedores.join(", ")),
        );
        set(
            &self.sheet,
            &mut row,
            "ADVOGADOS DEVEDOR",
            CellValue::text(record.advogados_devedores.join(", ")),
        );
        set(&self.sheet, &mut row, "PDF", record.pdf_cell());

        for (tipo, nome, advogado) in &record.outras_partes {
            set(&self.sheet, &mut row, tipo, CellValue::text(nome.clone()));
            set(
                &self.sheet,
                &mut row,
                &format!("ADVOGADOS {}", tipo.to_uppercase()),
                CellValue::text(advogado.clone()),
            );
        }

        self.sheet.rows.push(row);
        self.sheet.save(&self.path)
    }
}

/// First free `{base}_{n}.xlsx` in `dir`, so repeated runs never overwrite
/// an earlier report.
pub fn next_output_path(dir: &Path, base: &str) -> PathBuf {
    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{base}_{counter}.xlsx"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Raw values of the case-number column, one per data row, untrimmed rows
/// included so callers can report blanks. The column is found by name
/// ("numero_processo"/"Processo", then any header containing
/// "processo"/"numero"), defaulting to the first column.
pub fn load_case_column(path: &Path) -> Result<Vec<String>> {
    let sheet = Sheet::load(path)?;
    let col = case_column_index(&sheet.headers);
    Ok(sheet
        .rows
        .iter()
        .map(|row| {
            row.get(col)
                .map(|cell| cell.as_text().trim().to_string())
                .unwrap_or_default()
        })
        .collect())
}

/// Case numbers ready for the scrape loop: blanks and NaN-like markers
/// dropped, truncated to `limit` when given.
pub fn load_case_numbers(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    let mut numbers: Vec<String> = load_case_column(path)?
        .into_iter()
        .filter(|value| !is_blank_case(value))
        .collect();
    if let Some(limit) = limit {
        numbers.truncate(limit);
    }
    Ok(numbers)
}

pub fn is_blank_case(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    lower.is_empty() || lower == "nan" || lower == "none"
}

fn case_column_index(headers: &[String]) -> usize {
    if let Some(idx) = headers
        .iter()
        .position(|h| h == "numero_processo" || h == "Processo")
    {
        return idx;
    }
    headers
        .iter()
        .position(|h| {
            let lower = h.to_lowercase();
            lower.contains("processo") || lower.contains("numero")
        })
        .unwrap_or(0)
}

/// The locate-pdfs report: three fixed columns with a bold header and the
/// column widths sized for full paths.
pub fn write_pdf_path_report(
    path: &Path,
    rows: &[(String, String, String)],
) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Caminhos PDFs")?;
    let bold = Format::new().set_bold();

    let headers = ["Número do Processo", "Caminho do PDF", "Status"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (row_idx, (numero, caminho, status)) in rows.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        worksheet.write_string(row, 0, numero)?;
        worksheet.write_string(row, 1, caminho)?;
        worksheet.write_string(row, 2, status)?;
    }

    worksheet.set_column_width(0, 30)?;
    worksheet.set_column_width(1, 80)?;
    worksheet.set_column_width(2, 15)?;

    workbook.save(path).with_context(|| {
        format!(
            "Não foi possível salvar o arquivo {} (verifique se está aberto)",
            path.display()
        )
    })?;
    Ok(())
}
